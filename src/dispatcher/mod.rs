//! Bounded background job dispatcher
//!
//! Report requests are answered right away and the work runs later on a fixed
//! pool of worker tasks. [`JobQueue`] is the producer handle: cheap to clone,
//! `submit` never waits. [`JobDispatcher`] owns the workers, the process-wide
//! cancellation token and the event channel.
//!
//! At most `max_concurrent_jobs` jobs execute at once; the queue itself is
//! unbounded. A failing or panicking job is logged and reported through
//! [`Event::JobFailed`]; it never takes a worker down.
//!
//! # Example
//!
//! ```no_run
//! use history_export::config::DispatcherConfig;
//! use history_export::dispatcher::{JobDispatcher, JobQueue};
//!
//! # async fn example() -> history_export::Result<()> {
//! let queue = JobQueue::new();
//! let dispatcher = JobDispatcher::new(queue.clone(), &DispatcherConfig::default());
//! dispatcher.run().await;
//!
//! queue.submit("greeting", |_cancel| async move {
//!     tracing::info!("hello from a worker");
//!     Ok(())
//! })?;
//!
//! dispatcher.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod worker;

use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::types::{Event, JobId};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Future returned by a job
pub type JobFuture = BoxFuture<'static, Result<()>>;

/// Unit of background work; receives the dispatcher's cancellation token
pub type Job = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;

pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) name: String,
    pub(crate) job: Job,
}

struct QueueState {
    jobs: std::sync::Mutex<VecDeque<QueuedJob>>,
    available: Notify,
    accepting: AtomicBool,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
}

/// Producer handle of the job queue
#[derive(Clone)]
pub struct JobQueue {
    state: Arc<QueueState>,
}

impl JobQueue {
    /// Create an empty queue with its own event channel
    pub fn new() -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            state: Arc::new(QueueState {
                jobs: std::sync::Mutex::new(VecDeque::new()),
                available: Notify::new(),
                accepting: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
                event_tx,
            }),
        }
    }

    /// Enqueue a job and return immediately
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once the dispatcher began shutting down.
    pub fn submit<F, Fut>(&self, name: impl Into<String>, job: F) -> Result<JobId>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if !self.state.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = JobId(self.state.next_id.fetch_add(1, Ordering::SeqCst));
        let name = name.into();
        let job: Job = Box::new(move |cancel| Box::pin(job(cancel)) as JobFuture);

        let depth = {
            let mut jobs = self.lock_jobs();
            jobs.push_back(QueuedJob {
                id,
                name: name.clone(),
                job,
            });
            jobs.len()
        };
        self.state.available.notify_one();

        tracing::debug!(job_id = %id, job = %name, queue_depth = depth, "Job queued");
        let _ = self.state.event_tx.send(Event::JobQueued { id, name });
        Ok(id)
    }

    /// Number of jobs waiting for a worker
    pub fn len(&self) -> usize {
        self.lock_jobs().len()
    }

    /// True when no job is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `submit` still accepts jobs
    pub fn is_accepting(&self) -> bool {
        self.state.accepting.load(Ordering::SeqCst)
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.state.event_tx.subscribe()
    }

    pub(crate) fn pop(&self) -> Option<QueuedJob> {
        self.lock_jobs().pop_front()
    }

    pub(crate) fn emit(&self, event: Event) {
        let _ = self.state.event_tx.send(event);
    }

    fn close(&self) -> usize {
        self.state.accepting.store(false, Ordering::SeqCst);
        let mut jobs = self.lock_jobs();
        let dropped = jobs.len();
        jobs.clear();
        dropped
    }

    fn notified(&self) -> Notified<'_> {
        self.state.available.notified()
    }

    fn wake_one(&self) {
        self.state.available.notify_one();
    }

    // never held across an await
    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedJob>> {
        self.state.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("queued", &self.len())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

/// Runs queued jobs on a bounded pool of worker tasks
pub struct JobDispatcher {
    queue: JobQueue,
    max_concurrent_jobs: usize,
    shutdown_timeout: std::time::Duration,
    cancel: CancellationToken,
    running: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobDispatcher {
    /// Create a dispatcher draining `queue`
    ///
    /// No worker runs until [`run`](Self::run) is called.
    pub fn new(queue: JobQueue, config: &DispatcherConfig) -> Self {
        Self {
            queue,
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            shutdown_timeout: config.shutdown_timeout,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicUsize::new(0)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Producer handle of the drained queue
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Token cancelled when shutdown begins
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.queue.subscribe()
    }

    /// Number of jobs executing right now
    pub fn running_jobs(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Configured worker count
    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("queue", &self.queue)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("running", &self.running_jobs())
            .finish_non_exhaustive()
    }
}
