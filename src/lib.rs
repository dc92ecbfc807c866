//! # history-export
//!
//! Background pipeline that exports chat and channel history from Microsoft Graph
//! into report documents stored in OneDrive or a team's SharePoint library.
//!
//! ## Pipeline
//!
//! Each report request becomes one job on a bounded worker pool:
//!
//! 1. [`graph::HistoryFetcher`] pages through the message collection, stopping
//!    early at the requested cutoff
//! 2. [`threads::reconstruct`] groups messages into conversation threads
//! 3. a [`render::ReportRenderer`] produces the document
//! 4. [`graph::DriveUploader`] stores it, directly or through an upload session
//!
//! Every Graph request goes through [`retry::RequestExecutor`], which honors
//! `Retry-After` on throttling and server errors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use history_export::{
//!     Config, HistoryReportService, JobDispatcher, JobQueue,
//!     RendererRegistry, ReportFormat, ReportParameters, ReportPeriod, ReportScope,
//!     StaticToken, run_with_shutdown,
//! };
//! use history_export::types::DriveScope;
//! use std::sync::Arc;
//!
//! # struct LogNotifier;
//! # #[async_trait::async_trait]
//! # impl history_export::FailureNotifier for LogNotifier {
//! #     async fn report_ready(&self, _: &ReportParameters, _: &history_export::UploadedItem) {}
//! #     async fn report_failed(&self, _: &ReportParameters, _: &history_export::Error) {}
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let service = Arc::new(HistoryReportService::new(
//!         &config,
//!         Arc::new(StaticToken::new("eyJ0eXAi...")),
//!         Arc::new(RendererRegistry::with_builtins()),
//!     ));
//!
//!     let queue = JobQueue::new();
//!     let dispatcher = JobDispatcher::new(queue.clone(), &config.dispatcher);
//!     dispatcher.run().await;
//!
//!     service.submit_report(
//!         &queue,
//!         ReportParameters {
//!             scope: ReportScope::Chat { chat_id: "19:abc@thread.v2".to_string() },
//!             period: ReportPeriod::Last7Days,
//!             format: ReportFormat::Txt,
//!             drive: DriveScope::Personal,
//!             author: Some("Adele Vance".to_string()),
//!             team_name: None,
//!             channel_name: None,
//!         },
//!         Arc::new(LogNotifier),
//!     )?;
//!
//!     run_with_shutdown(dispatcher).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Bounded background job dispatcher
pub mod dispatcher;
/// Error types
pub mod error;
/// Microsoft Graph history and drive access
pub mod graph;
/// Report rendering
pub mod render;
/// Report pipeline
pub mod report;
/// Retry logic for transient HTTP failures
pub mod retry;
/// Thread reconstruction
pub mod threads;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, DispatcherConfig, RetryConfig};
pub use dispatcher::{Job, JobDispatcher, JobQueue};
pub use error::{Error, FetchError, RequestError, Result, UploadError};
pub use graph::{DriveUploader, GraphClient, HistoryFetcher, StaticToken, TokenProvider};
pub use render::{JsonRenderer, RendererRegistry, ReportRenderer, TxtRenderer};
pub use report::{FailureNotifier, HistoryReportService};
pub use retry::RequestExecutor;
pub use threads::reconstruct;
pub use types::{
    Event, JobId, Message, MessageThread, ReportDetails, ReportFormat, ReportParameters,
    ReportPeriod, ReportScope, UploadedItem,
};

/// Run the dispatcher until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Workers are started if [`JobDispatcher::run`] was not called yet.
///
/// # Errors
///
/// Propagates the result of [`JobDispatcher::shutdown`].
pub async fn run_with_shutdown(dispatcher: JobDispatcher) -> Result<()> {
    dispatcher.run().await;
    wait_for_signal().await;
    dispatcher.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
