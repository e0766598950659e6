use reqwest::StatusCode;
use thiserror::Error;

/// Failures of the query → prompt → completion pipeline.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Query cannot be empty")]
    EmptyQuery,

    #[error("Query is {len} characters, limit is {max}")]
    QueryTooLong { len: usize, max: usize },

    /// Non-success HTTP status; the body is logged, never carried.
    #[error("Completion endpoint returned HTTP {status}")]
    UpstreamError { status: StatusCode },

    #[error("Completion endpoint returned no content")]
    EmptyUpstreamResponse,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SearchError {
    /// Validation failures are actionable and may be shown verbatim.
    pub fn is_user_safe(&self) -> bool {
        matches!(
            self,
            SearchError::EmptyQuery | SearchError::QueryTooLong { .. }
        )
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::Transport(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("Clipboard write failed: {0}")]
    WriteFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_validation_errors_are_user_safe() {
        assert!(SearchError::EmptyQuery.is_user_safe());
        assert!(SearchError::QueryTooLong { len: 101, max: 100 }.is_user_safe());
        assert!(!SearchError::UpstreamError {
            status: StatusCode::INTERNAL_SERVER_ERROR
        }
        .is_user_safe());
        assert!(!SearchError::EmptyUpstreamResponse.is_user_safe());
        assert!(!SearchError::Transport("reset".into()).is_user_safe());
    }

    #[test]
    fn upstream_error_message_omits_body() {
        let err = SearchError::UpstreamError {
            status: StatusCode::BAD_GATEWAY,
        };
        assert_eq!(
            err.to_string(),
            "Completion endpoint returned HTTP 502 Bad Gateway"
        );
    }
}
