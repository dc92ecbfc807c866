//! Configuration types for history-export

use crate::error::{Error, Result};
use crate::types::ReportFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upload payloads up to this size go through a single PUT (4 MiB)
pub const SMALL_FILE_LIMIT: usize = 4 * 1024 * 1024;

/// Graph requires upload session chunks to be multiples of 320 KiB
pub const CHUNK_ALIGNMENT: usize = 320 * 1024;

/// Main configuration for the export pipeline
///
/// Settings are grouped into sub-configs, one per pipeline component:
/// - [`graph`](GraphConfig) — remote endpoint
/// - [`retry`](RetryConfig) — transient failure handling for every request
/// - [`fetch`](FetchConfig) — history paging
/// - [`upload`](UploadConfig) — drive upload thresholds and chunking
/// - [`dispatcher`](DispatcherConfig) — background job concurrency
/// - [`report`](ReportConfig) — report naming and enabled formats
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote Graph endpoint settings
    #[serde(default)]
    pub graph: GraphConfig,

    /// Retry behavior for transient HTTP failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// History fetching behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Drive upload behavior
    #[serde(default)]
    pub upload: UploadConfig,

    /// Background job dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Report output settings
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Check the configuration for values the pipeline cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.graph.endpoint).is_err() {
            return Err(config_error(
                "graph.endpoint",
                format!("'{}' is not a valid URL", self.graph.endpoint),
            ));
        }
        if self.fetch.page_size == 0 || self.fetch.page_size > 50 {
            return Err(config_error(
                "fetch.page_size",
                format!("page size must be in 1..=50, got {}", self.fetch.page_size),
            ));
        }
        if self.upload.chunk_size == 0 || self.upload.chunk_size % CHUNK_ALIGNMENT != 0 {
            return Err(config_error(
                "upload.chunk_size",
                format!(
                    "chunk size must be a non-zero multiple of {} bytes, got {}",
                    CHUNK_ALIGNMENT, self.upload.chunk_size
                ),
            ));
        }
        if self.upload.session_attempts == 0 {
            return Err(config_error(
                "upload.session_attempts",
                "at least one upload session attempt is required",
            ));
        }
        if self.dispatcher.max_concurrent_jobs == 0 {
            return Err(config_error(
                "dispatcher.max_concurrent_jobs",
                "at least one worker is required",
            ));
        }
        Ok(())
    }
}

fn config_error(key: &str, message: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// Remote Graph endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Versioned Graph base URL (default: "https://graph.microsoft.com/beta")
    #[serde(default = "default_graph_endpoint")]
    pub endpoint: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: default_graph_endpoint(),
        }
    }
}

/// Retry configuration for transient failures (HTTP 429 and 5xx)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries per request (default: 8)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay used when the server sends no usable Retry-After header (default: 3000 ms)
    #[serde(default = "default_retry_after", with = "duration_ms_serde")]
    pub default_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            default_retry_after: default_retry_after(),
        }
    }
}

/// History paging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Messages requested per page, sent as `$top` (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Fetch the reply collection of every channel root message (default: true)
    ///
    /// The channel messages endpoint only lists thread roots; without expansion a
    /// channel report contains no replies.
    #[serde(default = "default_true")]
    pub expand_channel_replies: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            expand_channel_replies: true,
        }
    }
}

/// Drive upload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest payload uploaded with a single PUT (default: 4 MiB)
    #[serde(default = "default_small_file_limit")]
    pub small_file_limit: usize,

    /// Bytes per upload session chunk (default: 320 * 4 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Full session attempts before giving up on a large upload (default: 2)
    #[serde(default = "default_session_attempts")]
    pub session_attempts: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            small_file_limit: default_small_file_limit(),
            chunk_size: default_chunk_size(),
            session_attempts: default_session_attempts(),
        }
    }
}

/// Background job dispatcher configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum jobs executing at the same time (default: 50)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// How long shutdown waits for running jobs (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_ms_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Report output configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Drive folder that receives reports (None = drive root)
    #[serde(default)]
    pub reports_folder: Option<String>,

    /// Formats offered to users (default: all)
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            reports_folder: None,
            formats: default_formats(),
        }
    }
}

fn default_graph_endpoint() -> String {
    "https://graph.microsoft.com/beta".to_string()
}

fn default_max_retries() -> u32 {
    8
}

fn default_retry_after() -> Duration {
    Duration::from_millis(3000)
}

fn default_page_size() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_small_file_limit() -> usize {
    SMALL_FILE_LIMIT
}

fn default_chunk_size() -> usize {
    320 * 4 * 1024
}

fn default_session_attempts() -> u32 {
    2
}

fn default_max_concurrent_jobs() -> usize {
    50
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_formats() -> Vec<ReportFormat> {
    vec![
        ReportFormat::Html,
        ReportFormat::Pdf,
        ReportFormat::Json,
        ReportFormat::Txt,
    ]
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
