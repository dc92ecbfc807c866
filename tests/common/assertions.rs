//! Event waiting helpers and a recording notifier

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use history_export::{Error, Event, FailureNotifier, JobId, ReportParameters, UploadedItem};
use tokio::sync::broadcast;

/// Result of waiting for a job to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Job completed successfully
    Completed,
    /// Job failed with error
    Failed(String),
    /// Timeout waiting for completion
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a job to reach a terminal event
pub async fn wait_for_job(
    events: &mut broadcast::Receiver<Event>,
    id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::JobCompleted { id: event_id }) if event_id == id => {
                    return WaitResult::Completed;
                }
                Ok(Event::JobFailed {
                    id: event_id,
                    error,
                }) if event_id == id => {
                    return WaitResult::Failed(error);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Outcome recorded by [`RecordingNotifier`]
#[derive(Debug, Clone)]
pub enum Notification {
    /// `report_ready` was called
    Ready(UploadedItem),
    /// `report_failed` was called with this error message
    Failed(String),
}

/// Notifier that stores every call for later assertions
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Snapshot of the recorded calls
    pub fn calls(&self) -> Vec<Notification> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn report_ready(&self, _params: &ReportParameters, item: &UploadedItem) {
        self.calls
            .lock()
            .unwrap()
            .push(Notification::Ready(item.clone()));
    }

    async fn report_failed(&self, _params: &ReportParameters, error: &Error) {
        self.calls
            .lock()
            .unwrap()
            .push(Notification::Failed(error.to_string()));
    }
}
