pub mod clipboard;
pub mod completion;
pub mod config;
pub mod error;
pub mod locale;
pub mod markdown;
pub mod prompt;
pub mod search;
pub mod sse;

pub use clipboard::{Clipboard, ClipboardCoordinator, CopyAction, CopySnapshot, CopyState, SystemClipboard};
pub use completion::{CompletionBackend, CompletionClient, CompletionRequest, CompletionResult};
pub use config::Config;
pub use error::{ClipboardError, SearchError};
pub use locale::{Locale, Messages};
pub use markdown::{render, strip_formatting};
pub use prompt::{build_prompt, Prompt};
pub use search::{SearchController, SearchPhase, SearchSnapshot};
pub use sse::{collect_stream, ChunkStream};

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::info;

const LOG_RETENTION_DAYS: u64 = 14;
const LOG_FILE_PREFIX: &str = "topiclens.log";
const DEFAULT_LOG_FILTER: &str = "info,reqwest=warn,hyper=warn";

fn build_log_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_env("TOPICLENS_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn cleanup_old_logs(log_dir: &Path, retention: Duration) -> usize {
    let cutoff = match SystemTime::now().checked_sub(retention) {
        Some(time) => time,
        None => return 0,
    };

    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !file_name.starts_with(LOG_FILE_PREFIX) {
            continue;
        }
        let modified = match entry.metadata().and_then(|meta| meta.modified()) {
            Ok(time) => time,
            Err(_) => continue,
        };
        if modified < cutoff && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    removed
}

/// Installs the global subscriber: daily rolling files under
/// `~/.topiclens/logs`, or stderr when that directory is unusable. Keep the
/// returned guard alive for the life of the process.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = match config::logs_dir() {
        Ok(dir) if std::fs::create_dir_all(&dir).is_ok() => dir,
        _ => {
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_env_filter(build_log_filter())
                .try_init();
            return None;
        }
    };

    let removed = cleanup_old_logs(&log_dir, Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60));

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let installed = tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(build_log_filter())
        .try_init();
    if installed.is_err() {
        return None;
    }

    info!(
        log_dir = %log_dir.display(),
        retention_days = LOG_RETENTION_DAYS,
        removed_logs = removed,
        "Logging initialized"
    );
    Some(guard)
}
