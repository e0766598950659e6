use crate::config::Config;
use crate::error::SearchError;
use crate::locale::Locale;
use crate::prompt::{self, Prompt};
use crate::sse::{self, ChunkStream};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, Instrument};

/// Longest accepted query, counted in characters.
pub const MAX_QUERY_CHARS: usize = 100;

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_SEQ.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Body of a chat-completion call. Always one system message followed by
/// one user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    pub fn new(config: &Config, prompt: Prompt, stream: bool) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream,
            messages: vec![
                Message {
                    role: Role::System,
                    content: prompt.system,
                },
                Message {
                    role: Role::User,
                    content: prompt.user,
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
    }
}

/// The assembled answer of one completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: String,
}

impl CompletionResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Local validation shared by the controller: non-empty after trimming and
/// at most [`MAX_QUERY_CHARS`] characters.
pub fn validate_query(query: &str) -> Result<&str, SearchError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let len = query.chars().count();
    if len > MAX_QUERY_CHARS {
        return Err(SearchError::QueryTooLong {
            len,
            max: MAX_QUERY_CHARS,
        });
    }
    Ok(trimmed)
}

/// Seam between the controller and the network.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, query: &str, locale: Locale) -> Result<CompletionResult, SearchError>;

    async fn stream_complete(&self, query: &str, locale: Locale) -> Result<ChunkStream, SearchError>;
}

pub struct CompletionClient {
    http: reqwest::Client,
    config: Config,
}

impl CompletionClient {
    pub fn new(config: Config) -> Result<Self, SearchError> {
        config
            .validate()
            .map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn build_request(&self, query: &str, locale: Locale, stream: bool) -> CompletionRequest {
        CompletionRequest::new(&self.config, prompt::build_prompt(query, locale), stream)
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, SearchError> {
        let start = Instant::now();
        let mut builder = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(request);
        if request.stream {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        } else {
            builder = builder.timeout(self.config.timeout());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Completion request failed"
                );
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status = %status,
                duration_ms = start.elapsed().as_millis(),
                body_preview = %preview(&body, 400),
                "Completion endpoint returned an error"
            );
            return Err(SearchError::UpstreamError { status });
        }

        info!(
            status = %status,
            duration_ms = start.elapsed().as_millis(),
            "Completion response received"
        );
        Ok(response)
    }

    /// Buffered mode: one request, whole answer.
    pub async fn complete(&self, query: &str, locale: Locale) -> Result<CompletionResult, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let request_id = next_request_id();
        let span = tracing::info_span!(
            "completion",
            request_id,
            model = %self.config.model,
            locale = %locale,
            stream = false
        );

        self.fetch(query, locale).instrument(span).await
    }

    /// Streaming mode: the request is sent before this returns, so status
    /// failures surface here; the body is consumed lazily by the caller.
    pub async fn stream_complete(&self, query: &str, locale: Locale) -> Result<ChunkStream, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let request_id = next_request_id();
        let span = tracing::info_span!(
            "completion",
            request_id,
            model = %self.config.model,
            locale = %locale,
            stream = true
        );

        self.open_stream(query, locale).instrument(span).await
    }

    async fn fetch(&self, query: &str, locale: Locale) -> Result<CompletionResult, SearchError> {
        let request = self.build_request(query, locale, false);
        info!(
            query_len = query.chars().count(),
            prompt_len = request.messages[1].content.len(),
            query_preview = %preview(query, 100),
            "Completion request prepared"
        );

        let response = self.send(&request).await?;
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Completion response read failed");
                return Err(e.into());
            }
        };

        let parsed: ChatResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(
                    error = %e,
                    body_preview = %preview(&body, 400),
                    "Completion response parse failed"
                );
                return Err(SearchError::EmptyUpstreamResponse);
            }
        };

        let content = match parsed.into_content() {
            Some(content) => content,
            None => {
                error!(
                    body_preview = %preview(&body, 400),
                    "Completion response missing choices[0].message.content"
                );
                return Err(SearchError::EmptyUpstreamResponse);
            }
        };

        debug!(
            response_len = content.len(),
            response_preview = %preview(&content, 400),
            "Completion response parsed"
        );
        Ok(CompletionResult::new(content))
    }

    async fn open_stream(&self, query: &str, locale: Locale) -> Result<ChunkStream, SearchError> {
        let request = self.build_request(query, locale, true);
        info!(
            query_len = query.chars().count(),
            query_preview = %preview(query, 100),
            "Streaming completion request prepared"
        );
        let response = self.send(&request).await?;
        Ok(sse::chunk_stream(response.bytes_stream()))
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(&self, query: &str, locale: Locale) -> Result<CompletionResult, SearchError> {
        CompletionClient::complete(self, query, locale).await
    }

    async fn stream_complete(&self, query: &str, locale: Locale) -> Result<ChunkStream, SearchError> {
        CompletionClient::stream_complete(self, query, locale).await
    }
}

pub(crate) fn preview(input: &str, limit: usize) -> String {
    let cleaned = input.replace(['\n', '\r'], " ");
    let mut out = String::new();
    let mut chars = cleaned.chars();
    for _ in 0..limit {
        if let Some(ch) = chars.next() {
            out.push(ch);
        } else {
            return out;
        }
    }
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}
