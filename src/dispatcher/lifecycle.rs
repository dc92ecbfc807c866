//! Shutdown coordination

use super::JobDispatcher;
use crate::error::Result;
use crate::types::Event;

impl JobDispatcher {
    /// Gracefully shut down the dispatcher
    ///
    /// 1. Stops accepting new jobs and drops the ones still queued
    /// 2. Cancels the shared token so running jobs wind down
    /// 3. Waits for the workers, bounded by the configured shutdown timeout
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// # Errors
    ///
    /// Currently always succeeds; a timeout is logged, not returned.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        let dropped = self.queue.close();
        if dropped > 0 {
            tracing::warn!(dropped, "Discarded queued jobs that never started");
        }

        self.cancel.cancel();
        tracing::info!(running = self.running_jobs(), "Signaled cancellation to running jobs");

        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        let wait = futures::future::join_all(workers);

        match tokio::time::timeout(self.shutdown_timeout, wait).await {
            Ok(results) => {
                for result in results.into_iter().filter_map(|r| r.err()) {
                    tracing::warn!(error = %result, "Worker ended abnormally");
                }
                tracing::info!("All workers stopped");
            }
            Err(_) => {
                tracing::warn!(
                    running = self.running_jobs(),
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Timeout waiting for running jobs, proceeding with shutdown"
                );
            }
        }

        self.queue.emit(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
