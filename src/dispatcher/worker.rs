//! Worker loops

use super::{JobDispatcher, JobQueue, QueuedJob};
use crate::error::Error;
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

impl JobDispatcher {
    /// Start the worker pool
    ///
    /// Spawns `max_concurrent_jobs` worker tasks. Each worker repeatedly:
    /// 1. Waits for a queued job or for cancellation
    /// 2. Runs the job with the shared cancellation token
    /// 3. Logs and reports the outcome, then goes back to 1
    ///
    /// Calling `run` again while workers are alive does nothing.
    pub async fn run(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            tracing::debug!("Worker pool already running");
            return;
        }

        for worker in 0..self.max_concurrent_jobs {
            let queue = self.queue.clone();
            let cancel = self.cancel.clone();
            let running = Arc::clone(&self.running);
            workers.push(tokio::spawn(worker_loop(worker, queue, cancel, running)));
        }

        tracing::info!(workers = self.max_concurrent_jobs, "Job dispatcher started");
    }
}

async fn worker_loop(
    worker: usize,
    queue: JobQueue,
    cancel: CancellationToken,
    running: Arc<AtomicUsize>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        // registered before the queue check so a concurrent submit is not missed;
        // dropped before the job runs so wake-ups reach idle workers
        let next = {
            let notified = queue.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match queue.pop() {
                Some(job) => Some(job),
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = &mut notified => {}
                    }
                    None
                }
            }
        };

        if let Some(job) = next {
            if !queue.is_empty() {
                queue.wake_one();
            }
            run_job(worker, &queue, &cancel, &running, job).await;
        }
    }

    tracing::debug!(worker, "Worker stopped");
}

async fn run_job(
    worker: usize,
    queue: &JobQueue,
    cancel: &CancellationToken,
    running: &AtomicUsize,
    queued: QueuedJob,
) {
    let QueuedJob { id, name, job } = queued;

    running.fetch_add(1, Ordering::SeqCst);
    queue.emit(Event::JobStarted { id });
    tracing::info!(job_id = %id, job = %name, worker, "Job started");

    // a separate task so a panic stays inside the job
    let token = cancel.clone();
    let outcome = tokio::spawn(async move { job(token).await }).await;

    let result = match outcome {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            Err(Error::JobPanicked(panic_message(join_error.into_panic())))
        }
        Err(join_error) => Err(Error::Other(format!("job task aborted: {join_error}"))),
    };

    running.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(()) => {
            tracing::info!(job_id = %id, job = %name, "Job completed");
            queue.emit(Event::JobCompleted { id });
        }
        Err(e) => {
            if e.is_cancelled() {
                tracing::warn!(job_id = %id, job = %name, "Job cancelled");
            } else {
                tracing::error!(job_id = %id, job = %name, error = %e, "Job failed");
            }
            queue.emit(Event::JobFailed {
                id,
                error: e.to_string(),
            });
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
