use crate::clipboard::{Clipboard, ClipboardCoordinator, CopyAction, CopySnapshot, SystemClipboard};
use crate::completion::{validate_query, CompletionBackend, CompletionClient, CompletionResult};
use crate::config::Config;
use crate::error::SearchError;
use crate::locale::{Locale, Messages};
use crate::sse::ChunkStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, Instrument};

/// Summary of the controller state, derived from the loading flag, error and
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchPhase {
    #[default]
    Idle,
    Loading,
    Success(Arc<CompletionResult>),
    /// Already translated, safe to display.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSnapshot {
    pub query: String,
    pub phase: SearchPhase,
    pub error: Option<String>,
    pub result: Option<Arc<CompletionResult>>,
    pub copy: CopySnapshot,
}

#[derive(Default)]
struct Inner {
    query: String,
    loading: bool,
    error: Option<String>,
    result: Option<Arc<CompletionResult>>,
    generation: u64,
}

impl Inner {
    fn phase(&self) -> SearchPhase {
        if self.loading {
            SearchPhase::Loading
        } else if let Some(message) = &self.error {
            SearchPhase::Error(message.clone())
        } else if let Some(result) = &self.result {
            SearchPhase::Success(Arc::clone(result))
        } else {
            SearchPhase::Idle
        }
    }
}

/// Owns the query, the search phase and the one live result; hands the
/// result to the clipboard coordinator for copies.
pub struct SearchController<B: CompletionBackend = CompletionClient, C: Clipboard = SystemClipboard> {
    backend: B,
    copier: ClipboardCoordinator<C>,
    messages: Messages,
    inner: Mutex<Inner>,
}

impl SearchController {
    pub fn from_config(config: Config, messages: Messages) -> Result<Self, SearchError> {
        let client = CompletionClient::new(config)?;
        Ok(Self::new(client, SystemClipboard, messages))
    }
}

impl<B: CompletionBackend, C: Clipboard> SearchController<B, C> {
    pub fn new(backend: B, clipboard: C, messages: Messages) -> Self {
        let copier = ClipboardCoordinator::new(clipboard, messages.copy_failed.clone());
        Self::with_coordinator(backend, copier, messages)
    }

    pub fn with_coordinator(backend: B, copier: ClipboardCoordinator<C>, messages: Messages) -> Self {
        Self {
            backend,
            copier,
            messages,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        let inner = self.lock();
        SearchSnapshot {
            query: inner.query.clone(),
            phase: inner.phase(),
            error: inner.error.clone(),
            result: inner.result.clone(),
            copy: self.copier.snapshot(),
        }
    }

    pub fn query(&self) -> String {
        self.lock().query.clone()
    }

    pub fn phase(&self) -> SearchPhase {
        self.lock().phase()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn result(&self) -> Option<Arc<CompletionResult>> {
        self.lock().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Keystroke handler. A displayed error is cleared unless a search is
    /// loading; a displayed result is left alone.
    pub fn set_query(&self, text: impl Into<String>) {
        let mut inner = self.lock();
        inner.query = text.into();
        if !inner.loading {
            inner.error = None;
        }
    }

    fn user_message(&self, err: &SearchError) -> String {
        match err {
            SearchError::EmptyQuery => self.messages.empty_input.clone(),
            SearchError::QueryTooLong { .. } => self.messages.too_long.clone(),
            _ => self.messages.search_failed.clone(),
        }
    }

    /// Searches with the stored query.
    pub async fn search(&self, locale: Locale) -> SearchPhase {
        let query = self.query();
        self.run(query, locale).await
    }

    /// Stores `query` and searches with it.
    pub async fn search_for(&self, query: &str, locale: Locale) -> SearchPhase {
        self.lock().query = query.to_string();
        self.run(query.to_string(), locale).await
    }

    async fn run(&self, query: String, locale: Locale) -> SearchPhase {
        let (generation, topic) = {
            let mut inner = self.lock();
            let topic = match validate_query(&query) {
                Ok(topic) => topic.to_string(),
                Err(e) => {
                    // Only the error changes; a displayed result and an
                    // in-flight search are left alone.
                    debug!(error = %e, "Query rejected locally");
                    let message = self.user_message(&e);
                    inner.error = Some(message.clone());
                    return SearchPhase::Error(message);
                }
            };
            inner.generation += 1;
            inner.loading = true;
            inner.error = None;
            inner.result = None;
            (inner.generation, topic)
        };

        let span = tracing::info_span!("search", search_id = generation, locale = %locale);
        let outcome = self
            .backend
            .complete(&topic, locale)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        let mut inner = self.lock();
        if inner.generation != generation {
            info!(current = inner.generation, "Superseded search finished, discarding");
            return inner.phase();
        }
        inner.loading = false;
        match outcome {
            Ok(result) => {
                info!(content_len = result.content.len(), "Search succeeded");
                let result = Arc::new(result);
                inner.error = None;
                inner.result = Some(Arc::clone(&result));
                SearchPhase::Success(result)
            }
            Err(e) => {
                error!(error = %e, "Search failed");
                let message = self.user_message(&e);
                inner.error = Some(message.clone());
                SearchPhase::Error(message)
            }
        }
    }

    /// Streaming variant for the UI boundary. Validation matches `search`;
    /// the controller's phase is not touched.
    pub async fn stream_search(&self, query: &str, locale: Locale) -> Result<ChunkStream, SearchError> {
        let topic = validate_query(query)?;
        self.backend.stream_complete(topic, locale).await.map_err(|e| {
            error!(error = %e, "Streaming search failed to start");
            e
        })
    }

    /// Copies the current result. Never changes the search phase.
    pub async fn copy(&self, action: CopyAction) -> CopySnapshot {
        let result = self.result();
        self.copier.request_copy(action, result.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::tests::FakeClipboard;
    use crate::clipboard::CopyState;
    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeBackend {
        calls: AtomicUsize,
        fail: bool,
        hold_first: Mutex<Option<Arc<Notify>>>,
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(&self, query: &str, _locale: Locale) -> Result<CompletionResult, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.hold_first.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(SearchError::UpstreamError {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            Ok(CompletionResult::new(format!("# {query}")))
        }

        async fn stream_complete(&self, query: &str, _locale: Locale) -> Result<ChunkStream, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let chunks = vec![Ok("# ".to_string()), Ok(query.to_string())];
            Ok(stream::iter(chunks).boxed())
        }
    }

    fn controller(backend: FakeBackend) -> SearchController<FakeBackend, FakeClipboard> {
        SearchController::new(backend, FakeClipboard::default(), Messages::for_locale(Locale::En))
    }

    #[tokio::test]
    async fn blank_and_long_queries_never_reach_backend() {
        let controller = controller(FakeBackend::default());
        let messages = Messages::for_locale(Locale::En);

        for query in ["", "   "] {
            let phase = controller.search_for(query, Locale::En).await;
            assert_eq!(phase, SearchPhase::Error(messages.empty_input.clone()));
        }
        let phase = controller.search_for(&"a".repeat(101), Locale::En).await;
        assert_eq!(phase, SearchPhase::Error(messages.too_long.clone()));
        assert!(controller.stream_search(" ", Locale::En).await.is_err());

        assert_eq!(controller.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_stores_result() {
        let controller = controller(FakeBackend::default());
        controller.set_query("Rust");
        let phase = controller.search(Locale::En).await;
        assert_eq!(phase, SearchPhase::Success(Arc::new(CompletionResult::new("# Rust"))));
        assert_eq!(controller.result().unwrap().content, "# Rust");
        assert_eq!(controller.error(), None);
    }

    #[tokio::test]
    async fn backend_failure_shows_generic_message() {
        let controller = controller(FakeBackend {
            fail: true,
            ..FakeBackend::default()
        });
        let phase = controller.search_for("Rust", Locale::En).await;
        let expected = Messages::for_locale(Locale::En).search_failed;
        assert_eq!(phase, SearchPhase::Error(expected));
        assert!(!controller.error().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn editing_query_clears_error_but_not_result() {
        let controller = controller(FakeBackend::default());
        controller.search_for("", Locale::En).await;
        assert!(controller.error().is_some());
        controller.set_query("R");
        assert_eq!(controller.phase(), SearchPhase::Idle);
        assert_eq!(controller.error(), None);

        controller.search_for("Rust", Locale::En).await;
        controller.set_query("Rus");
        assert_eq!(controller.result().unwrap().content, "# Rust");
        assert_eq!(controller.query(), "Rus");
    }

    #[tokio::test]
    async fn rejected_query_keeps_displayed_result() {
        let controller = controller(FakeBackend::default());
        controller.search_for("Rust", Locale::En).await;

        let phase = controller.search_for("   ", Locale::En).await;
        let empty_input = Messages::for_locale(Locale::En).empty_input;
        assert_eq!(phase, SearchPhase::Error(empty_input.clone()));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.error, Some(empty_input));
        assert_eq!(snapshot.result.unwrap().content, "# Rust");

        controller.set_query("Rus");
        assert_eq!(controller.error(), None);
        assert_eq!(controller.result().unwrap().content, "# Rust");
        assert_eq!(
            controller.phase(),
            SearchPhase::Success(Arc::new(CompletionResult::new("# Rust")))
        );
        assert_eq!(controller.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_query_during_search_keeps_loading() {
        let gate = Arc::new(Notify::new());
        let controller = Arc::new(controller(FakeBackend {
            hold_first: Mutex::new(Some(Arc::clone(&gate))),
            ..FakeBackend::default()
        }));

        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.search_for("Rust", Locale::En).await })
        };
        tokio::task::yield_now().await;
        assert!(controller.is_loading());

        controller.search_for("", Locale::En).await;
        assert!(controller.is_loading());
        assert!(controller.error().is_some());
        controller.set_query("R");
        assert!(controller.error().is_some());

        gate.notify_one();
        pending.await.unwrap();
        assert!(!controller.is_loading());
        assert_eq!(controller.error(), None);
        assert_eq!(controller.result().unwrap().content, "# Rust");
    }

    #[tokio::test]
    async fn new_search_discards_previous_result_immediately() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend::default();
        let controller = Arc::new(controller(backend));
        controller.search_for("first", Locale::En).await;
        assert!(controller.result().is_some());

        *controller.backend.hold_first.lock().unwrap() = Some(Arc::clone(&gate));
        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.search_for("second", Locale::En).await })
        };
        tokio::task::yield_now().await;
        assert!(controller.is_loading());
        assert!(controller.result().is_none());

        gate.notify_one();
        pending.await.unwrap();
        assert_eq!(controller.result().unwrap().content, "# second");
    }

    #[tokio::test]
    async fn superseded_search_does_not_overwrite_latest() {
        let gate = Arc::new(Notify::new());
        let controller = Arc::new(controller(FakeBackend {
            hold_first: Mutex::new(Some(Arc::clone(&gate))),
            ..FakeBackend::default()
        }));

        let slow = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.search_for("slow", Locale::En).await })
        };
        tokio::task::yield_now().await;

        controller.search_for("fast", Locale::En).await;
        gate.notify_one();
        slow.await.unwrap();

        assert_eq!(controller.result().unwrap().content, "# fast");
        assert_eq!(controller.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn copy_without_result_is_ignored() {
        let controller = controller(FakeBackend::default());
        let snapshot = controller.copy(CopyAction::Text).await;
        assert_eq!(snapshot.state, CopyState::Idle);
        assert_eq!(snapshot.last_action, None);
    }

    #[tokio::test]
    async fn copy_failure_keeps_result_visible() {
        let controller = SearchController::new(
            FakeBackend::default(),
            FakeClipboard::failing(),
            Messages::for_locale(Locale::En),
        );
        controller.search_for("Rust", Locale::En).await;
        let snapshot = controller.copy(CopyAction::Markdown).await;
        assert_eq!(snapshot.state, CopyState::Error);
        assert_eq!(
            snapshot.notice,
            Some(Messages::for_locale(Locale::En).copy_failed)
        );
        assert!(controller.result().is_some());
        assert_eq!(controller.snapshot().copy.state, CopyState::Error);
    }

    #[tokio::test]
    async fn stream_search_yields_chunks() {
        let controller = controller(FakeBackend::default());
        let stream = controller.stream_search(" Rust ", Locale::En).await.unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["# ".to_string(), "Rust".to_string()]);
    }
}
