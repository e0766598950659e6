//! Decoding of `text/event-stream` completion bodies into text chunks.

use crate::completion::{preview, CompletionResult};
use crate::error::SearchError;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;
use tracing::{debug, error, warn};

/// Lazy, finite, non-restartable sequence of answer fragments. Dropping it
/// drops the underlying response body.
pub type ChunkStream = BoxStream<'static, Result<String, SearchError>>;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Delta(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Reassembles lines across network reads. Bytes are kept until a full line
/// is available so multi-byte characters split between reads survive.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(frame) = decode_line(&line[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes an unterminated final line at end of body.
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<Frame> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    let trimmed = data.trim();
    if trimmed == DONE_SENTINEL {
        return Some(Frame::Done);
    }
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<StreamFrame>(data) {
        Ok(frame) => frame
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(Frame::Delta),
        Err(e) => {
            // Keep-alives and corrupt frames look the same here; skip both.
            warn!(
                error = %e,
                frame_preview = %preview(data, 200),
                "Skipping malformed stream frame"
            );
            None
        }
    }
}

struct StreamState {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    finished: bool,
    yielded: usize,
}

impl StreamState {
    fn enqueue(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            match frame {
                Frame::Delta(text) => self.pending.push_back(text),
                Frame::Done => {
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

/// Turns a raw body byte stream into a [`ChunkStream`]. Chunks are yielded
/// in arrival order; a transport failure is yielded once as the final item.
pub fn chunk_stream<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let body = body
        .map(|item| item.map(|bytes| bytes.as_ref().to_vec()).map_err(|e| e.to_string()))
        .boxed();
    let state = StreamState {
        body,
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        yielded: 0,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                state.yielded += 1;
                return Some((Ok(chunk), state));
            }
            if state.finished {
                debug!(chunks = state.yielded, "Completion stream finished");
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let frames = state.decoder.push(&bytes);
                    state.enqueue(frames);
                }
                Some(Err(e)) => {
                    error!(error = %e, chunks = state.yielded, "Completion stream transport failed");
                    state.finished = true;
                    return Some((Err(SearchError::Transport(e)), state));
                }
                None => {
                    let frames = state.decoder.finish();
                    state.enqueue(frames);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Drains a chunk stream into the equivalent buffered result.
pub async fn collect_stream(mut stream: ChunkStream) -> Result<CompletionResult, SearchError> {
    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        content.push_str(&chunk?);
    }
    Ok(CompletionResult::new(content))
}
