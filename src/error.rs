//! Error types for history-export
//!
//! This module provides error handling for every pipeline stage:
//! - [`RequestError`] for single Graph requests issued through the executor
//! - [`FetchError`] for history retrieval (aborts the job)
//! - [`UploadError`] for drive uploads (aborts the job)
//! - [`Error`], the crate-level error returned by jobs and the dispatcher
//!
//! Thread reconstruction has no error type: malformed parent references degrade
//! into extra partial threads instead of failing.

use std::fmt;
use thiserror::Error;

/// Result type alias for history-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for history-export
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "dispatcher.max_concurrent_jobs")
        key: Option<String>,
    },

    /// History retrieval failed
    #[error("history fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Report upload failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Report rendering failed or the format has no renderer
    #[error("render error: {0}")]
    Render(String),

    /// Access token could not be acquired
    #[error("token error: {0}")]
    Token(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// The job was cancelled through the shared cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// A job panicked while running on a worker
    #[error("job panicked: {0}")]
    JobPanicked(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if the error was caused by cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Cancelled
                | Error::Fetch(FetchError::Cancelled)
                | Error::Fetch(FetchError::Request(RequestError::Cancelled))
                | Error::Upload(UploadError::Cancelled)
                | Error::Upload(UploadError::Request(RequestError::Cancelled))
        )
    }
}

/// Server-provided identifiers attached to a failed Graph response
///
/// Graph returns `request-id`, `timestamp` and `x-ms-ags-diagnostic` headers which
/// support staff need to trace a failed call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationIds {
    /// Value of the `request-id` header
    pub request_id: Option<String>,
    /// Value of the `timestamp` header
    pub timestamp: Option<String>,
    /// Value of the `x-ms-ags-diagnostic` header
    pub diagnostic: Option<String>,
}

impl CorrelationIds {
    /// Collect correlation headers from a response header map
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            request_id: get("request-id"),
            timestamp: get("timestamp"),
            diagnostic: get("x-ms-ags-diagnostic"),
        }
    }
}

impl fmt::Display for CorrelationIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request-id: '{}', timestamp: '{}', diagnostic: '{}'",
            self.request_id.as_deref().unwrap_or_default(),
            self.timestamp.as_deref().unwrap_or_default(),
            self.diagnostic.as_deref().unwrap_or_default()
        )
    }
}

/// Failure of a single request issued through the [`RequestExecutor`](crate::retry::RequestExecutor)
#[derive(Debug, Error)]
pub enum RequestError {
    /// The server answered with a non-success status
    ///
    /// Either a permanent status (4xx other than 429) or a transient one
    /// (429/5xx) after the retry budget was spent.
    #[error("{method} '{url}' failed with HTTP {status} ({correlation})")]
    Status {
        /// HTTP method of the failed request
        method: String,
        /// URL of the failed request
        url: String,
        /// HTTP status code returned by the server
        status: u16,
        /// Correlation headers returned by the server
        correlation: CorrelationIds,
    },

    /// The request never produced a response (DNS, connect, TLS, body errors)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The shared cancellation token fired before or while waiting to retry
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// HTTP status of the failure, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            RequestError::Transport(e) => e.status().map(|s| s.as_u16()),
            RequestError::Cancelled => None,
        }
    }
}

/// History retrieval errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// A page or message request failed permanently
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A response body could not be decoded
    #[error("failed to decode response from '{url}': {source}")]
    Decode {
        /// URL whose body failed to decode
        url: String,
        /// Underlying decode error
        #[source]
        source: reqwest::Error,
    },

    /// The access token could not be acquired
    #[error("token error: {0}")]
    Token(String),

    /// Fetching stopped because the job was cancelled
    #[error("history fetch cancelled")]
    Cancelled,
}

/// Drive upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// A direct upload or session creation request failed permanently
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A drive item or upload session body could not be decoded
    #[error("failed to decode response from '{url}': {source}")]
    Decode {
        /// URL whose body failed to decode
        url: String,
        /// Underlying decode error
        #[source]
        source: reqwest::Error,
    },

    /// The upload session response did not include an upload URL
    #[error("upload session for '{path}' has no uploadUrl")]
    MissingSessionUrl {
        /// Destination path of the upload
        path: String,
    },

    /// No chunk returned a completed item after every session attempt
    #[error("upload of '{path}' did not complete after {attempts} session attempts ({} chunk errors)", errors.len())]
    Incomplete {
        /// Destination path of the upload
        path: String,
        /// Number of full session attempts made
        attempts: u32,
        /// Chunk errors accumulated over all attempts
        errors: Vec<String>,
    },

    /// The access token could not be acquired
    #[error("token error: {0}")]
    Token(String),

    /// Upload was abandoned because the job was cancelled
    #[error("upload cancelled")]
    Cancelled,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn correlation_ids_are_read_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("request-id", HeaderValue::from_static("abc-123"));
        headers.insert("x-ms-ags-diagnostic", HeaderValue::from_static("{\"ServerInfo\":{}}"));

        let ids = CorrelationIds::from_headers(&headers);

        assert_eq!(ids.request_id.as_deref(), Some("abc-123"));
        assert_eq!(ids.timestamp, None);
        assert_eq!(ids.diagnostic.as_deref(), Some("{\"ServerInfo\":{}}"));
    }

    #[test]
    fn status_error_message_includes_correlation() {
        let err = RequestError::Status {
            method: "GET".to_string(),
            url: "https://graph.example/chats/1/messages".to_string(),
            status: 403,
            correlation: CorrelationIds {
                request_id: Some("rid".to_string()),
                ..Default::default()
            },
        };

        let msg = err.to_string();
        assert!(msg.contains("HTTP 403"), "got: {msg}");
        assert!(msg.contains("request-id: 'rid'"), "got: {msg}");
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn incomplete_upload_reports_error_count() {
        let err = UploadError::Incomplete {
            path: "reports/a.txt".to_string(),
            attempts: 2,
            errors: vec!["chunk 0".to_string(), "chunk 1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "upload of 'reports/a.txt' did not complete after 2 session attempts (2 chunk errors)"
        );
    }

    #[test]
    fn cancellation_is_detected_through_wrappers() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::Fetch(FetchError::Cancelled).is_cancelled());
        assert!(Error::Upload(UploadError::Request(RequestError::Cancelled)).is_cancelled());
        assert!(!Error::Render("no renderer".to_string()).is_cancelled());
    }

    #[test]
    fn fetch_error_converts_into_crate_error() {
        let err: Error = FetchError::Token("expired".to_string()).into();
        assert!(matches!(err, Error::Fetch(FetchError::Token(_))));
        assert_eq!(err.to_string(), "history fetch error: token error: expired");
    }
}
