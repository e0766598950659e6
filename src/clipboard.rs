use crate::completion::CompletionResult;
use crate::error::ClipboardError;
use crate::markdown::strip_formatting;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// How long a success indicator stays up before reverting to idle.
pub const COPY_RESET_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyAction {
    Text,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyState {
    #[default]
    Idle,
    Copying,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CopySnapshot {
    pub state: CopyState,
    pub last_action: Option<CopyAction>,
    /// User-facing failure notice, present only in `Error`.
    pub notice: Option<String>,
}

impl CopySnapshot {
    fn new(state: CopyState, action: CopyAction) -> Self {
        Self {
            state,
            last_action: Some(action),
            notice: None,
        }
    }
}

/// The single shared clipboard-write capability.
#[async_trait]
pub trait Clipboard: Send + Sync + 'static {
    async fn write_text(&self, text: String) -> Result<(), ClipboardError>;
}

/// Platform clipboard via `arboard`, driven from a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

#[async_trait]
impl Clipboard for SystemClipboard {
    async fn write_text(&self, text: String) -> Result<(), ClipboardError> {
        tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            clipboard
                .set_text(text)
                .map_err(|e| ClipboardError::WriteFailed(e.to_string()))
        })
        .await
        .map_err(|e| ClipboardError::WriteFailed(e.to_string()))?
    }
}

#[derive(Default)]
struct Tracker {
    snapshot: CopySnapshot,
    generation: u64,
    reset_task: Option<JoinHandle<()>>,
}

fn lock(tracker: &Mutex<Tracker>) -> MutexGuard<'_, Tracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Copy-state machine over one clipboard. The most recent request always
/// owns the state; completions and reset timers of older requests are
/// discarded.
pub struct ClipboardCoordinator<C: Clipboard = SystemClipboard> {
    clipboard: Arc<C>,
    tracker: Arc<Mutex<Tracker>>,
    reset_delay: Duration,
    copy_failed: String,
}

impl<C: Clipboard> ClipboardCoordinator<C> {
    pub fn new(clipboard: C, copy_failed: impl Into<String>) -> Self {
        Self {
            clipboard: Arc::new(clipboard),
            tracker: Arc::new(Mutex::new(Tracker::default())),
            reset_delay: COPY_RESET_DELAY,
            copy_failed: copy_failed.into(),
        }
    }

    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    pub fn snapshot(&self) -> CopySnapshot {
        lock(&self.tracker).snapshot.clone()
    }

    /// Copies `result` in the requested form. No-op without a result.
    pub async fn request_copy(
        &self,
        action: CopyAction,
        result: Option<&CompletionResult>,
    ) -> CopySnapshot {
        let Some(result) = result else {
            debug!(action = ?action, "Copy requested with no result");
            return self.snapshot();
        };

        let generation = {
            let mut tracker = lock(&self.tracker);
            if let Some(task) = tracker.reset_task.take() {
                task.abort();
            }
            tracker.generation += 1;
            tracker.snapshot = CopySnapshot::new(CopyState::Copying, action);
            tracker.generation
        };

        let payload = match action {
            CopyAction::Text => strip_formatting(&result.content),
            CopyAction::Markdown => result.content.clone(),
        };
        let payload_len = payload.len();
        let outcome = self.clipboard.write_text(payload).await;

        let mut tracker = lock(&self.tracker);
        if tracker.generation != generation {
            debug!(action = ?action, generation, "Superseded copy finished, ignoring");
            return tracker.snapshot.clone();
        }
        match outcome {
            Ok(()) => {
                info!(action = ?action, payload_len, "Copied to clipboard");
                tracker.snapshot = CopySnapshot::new(CopyState::Success, action);
                tracker.reset_task = Some(self.schedule_reset(generation));
            }
            Err(e) => {
                error!(error = %e, action = ?action, "Clipboard write failed");
                tracker.snapshot = CopySnapshot {
                    notice: Some(self.copy_failed.clone()),
                    ..CopySnapshot::new(CopyState::Error, action)
                };
            }
        }
        tracker.snapshot.clone()
    }

    fn schedule_reset(&self, generation: u64) -> JoinHandle<()> {
        let tracker = Arc::clone(&self.tracker);
        let delay = self.reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut tracker = lock(&tracker);
            if tracker.generation == generation && tracker.snapshot.state == CopyState::Success {
                tracker.snapshot = CopySnapshot::default();
                tracker.reset_task = None;
                debug!(generation, "Copy indicator reset");
            }
        })
    }
}

impl<C: Clipboard> Drop for ClipboardCoordinator<C> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.tracker).reset_task.take() {
            task.abort();
        }
    }
}
