//! Request execution with bounded retry on transient HTTP failures
//!
//! Every Graph call made by the history fetcher and the drive uploader goes
//! through [`RequestExecutor::execute`]. HTTP 429 and 5xx responses are retried
//! after the server-directed `Retry-After` delay (or a configured default); every
//! other failure is permanent and is logged with the server's correlation headers.
//!
//! # Example
//!
//! ```no_run
//! use history_export::config::RetryConfig;
//! use history_export::retry::RequestExecutor;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), history_export::error::RequestError> {
//! let executor = RequestExecutor::new(&RetryConfig::default());
//! let client = reqwest::Client::new();
//! let cancel = CancellationToken::new();
//! let response = executor
//!     .execute(|| client.get("https://graph.microsoft.com/beta/me"), 3, &cancel)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{CorrelationIds, RequestError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (throttling, server errors) should return `true`.
/// Permanent failures (bad request, forbidden, not found) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the request should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            RequestError::Status { status, .. } => is_transient_status(*status),
            // only HTTP status drives retries
            RequestError::Transport(_) => false,
            RequestError::Cancelled => false,
        }
    }
}

/// HTTP 429 or any 5xx
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Issues HTTP requests, re-issuing them on transient failures
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    max_retries: u32,
    default_retry_after: Duration,
}

impl RequestExecutor {
    /// Create an executor from the retry configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            default_retry_after: config.default_retry_after,
        }
    }

    /// Retry budget from the configuration
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Execute a request, retrying transient failures up to `max_retries` times
    ///
    /// `build` is called once per attempt so the identical request is re-issued.
    /// Successful (2xx) responses are returned untouched.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Status`] for a permanent status or once retries are exhausted
    /// - [`RequestError::Transport`] when no response was received
    /// - [`RequestError::Cancelled`] when `cancel` fires before an attempt or during back-off
    pub async fn execute<F>(
        &self,
        mut build: F,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, RequestError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut remaining = max_retries;

        loop {
            if cancel.is_cancelled() {
                return Err(RequestError::Cancelled);
            }

            let (client, request) = build().build_split();
            let request = request?;
            let method = request.method().to_string();
            let url = request.url().to_string();

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                result = client.execute(request) => result?,
            };

            let status = response.status();
            if status.is_success() {
                if remaining < max_retries {
                    tracing::info!(
                        attempts = max_retries - remaining + 1,
                        url = %url,
                        "Request succeeded after retry"
                    );
                }
                return Ok(response);
            }

            let correlation = CorrelationIds::from_headers(response.headers());
            let error = RequestError::Status {
                method,
                url,
                status: status.as_u16(),
                correlation,
            };

            if error.is_retryable() && remaining > 0 {
                let delay = retry_after_delay(response.headers()).unwrap_or(self.default_retry_after);
                remaining -= 1;

                tracing::warn!(
                    status = status.as_u16(),
                    retries_left = remaining,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            if let RequestError::Status {
                method,
                url,
                status,
                correlation,
            } = &error
            {
                tracing::error!(
                    method = %method,
                    url = %url,
                    status = *status,
                    request_id = correlation.request_id.as_deref().unwrap_or_default(),
                    timestamp = correlation.timestamp.as_deref().unwrap_or_default(),
                    diagnostic = correlation.diagnostic.as_deref().unwrap_or_default(),
                    "Graph request error"
                );
            }
            return Err(error);
        }
    }
}

/// Parse the `Retry-After` header as whole seconds
///
/// Returns `None` when the header is absent or not an integer.
fn retry_after_delay(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
