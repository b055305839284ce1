//! Job queue and dispatcher - total ordering and single-concurrency
//! admission.
//!
//! The rendering engine is one shared stateful resource, so the queue is
//! an admission-control gate, not a FIFO convenience: exactly one job
//! holds the execution slot at any instant, system-wide, and jobs are
//! admitted in strict arrival order across all connections.
//!
//! The [`Scheduler`] owns the engine handle and the pending-job
//! sequence; it is constructed once at startup and connection code holds
//! a cloneable [`SchedulerHandle`] for enqueueing. No ambient globals.
//!
//! A slow job delays all subsequent jobs; there is no priority or
//! preemption. Widening the gate means pooling engine instances, which
//! this topology does not have.

use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::Notify;

use crate::actions::{Action, ActionContext, Reply};
use crate::config::{JobOverrides, ServiceConfig, ShotConfig};
use crate::connection::ConnectionHandle;
use crate::engine::RenderEngine;
use crate::error::Result;

/// One client-requested unit of work, tracked from enqueue to
/// completion.
pub struct Job {
    /// Externally supplied identifier; also keys the output directory.
    pub id: String,
    /// Resolved action.
    pub action: Action,
    /// Job-specific config fields from the request payload.
    pub overrides: JobOverrides,
    /// The requesting connection (non-owning; the connection may die
    /// while the job is queued).
    pub conn: ConnectionHandle,
    /// When the job entered the queue.
    pub enqueued_at: Instant,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("conn_uid", &self.conn.uid())
            .finish()
    }
}

/// Execution slot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueStatus {
    /// The slot is free; the next pending job may be admitted.
    Ready,
    /// A job holds the slot.
    Processing,
}

/// Pending jobs plus the execution slot, mutated only by the
/// dispatcher's admit/release transitions (and `enqueue`).
struct JobQueue {
    pending: VecDeque<Job>,
    status: QueueStatus,
}

/// What to do when a handler fails in an unmodeled way (panics).
///
/// Job-level errors are recovered at the dispatcher boundary and never
/// reach this policy.
#[derive(Clone)]
pub enum FailurePolicy {
    /// Exit the process non-zero. The supervised-restart contract: an
    /// unmodeled failure means the engine state is suspect and a fresh
    /// process is cheaper than guessing.
    ExitProcess,
    /// Invoke the hook instead of exiting, with `(job_id, detail)`.
    Hook(Arc<dyn Fn(&str, &str) + Send + Sync>),
}

impl FailurePolicy {
    /// A policy that calls `hook` instead of exiting.
    pub fn hook(hook: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        Self::Hook(Arc::new(hook))
    }

    fn unmodeled_failure(&self, job_id: &str, detail: &str) {
        tracing::error!(job_id, detail, "unmodeled handler failure");
        match self {
            Self::ExitProcess => std::process::exit(1),
            Self::Hook(hook) => hook(job_id, detail),
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::ExitProcess
    }
}

impl fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitProcess => f.write_str("FailurePolicy::ExitProcess"),
            Self::Hook(_) => f.write_str("FailurePolicy::Hook(..)"),
        }
    }
}

/// Running totals across all completed jobs.
#[derive(Debug, Default)]
struct JobCounters {
    total: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,
}

/// Snapshot of [`SchedulerHandle::counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CountersSnapshot {
    pub total: u64,
    pub success: u64,
    pub error: u64,
}

struct SchedulerInner {
    queue: Mutex<JobQueue>,
    notify: Notify,
    engine: Arc<dyn RenderEngine>,
    config: ServiceConfig,
    policy: FailurePolicy,
    counters: JobCounters,
}

impl SchedulerInner {
    /// Pop the head job if the slot is free.
    ///
    /// The job leaves `pending` exactly here, at admission.
    fn try_admit(&self) -> Option<Job> {
        let mut queue = self.queue.lock().expect("job queue lock poisoned");

        if queue.status != QueueStatus::Ready {
            return None;
        }

        let job = queue.pending.pop_front()?;
        queue.status = QueueStatus::Processing;
        Some(job)
    }

    /// Free the execution slot and wake the dispatcher.
    fn release_slot(&self) {
        let mut queue = self.queue.lock().expect("job queue lock poisoned");
        queue.status = QueueStatus::Ready;
        drop(queue);

        self.notify.notify_one();
    }
}

/// Enqueue-side handle to the scheduler. Cheap to clone.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<SchedulerInner>,
}

impl SchedulerHandle {
    /// Append a job to the tail of the queue and wake the dispatcher.
    ///
    /// Synchronous and non-blocking; never runs handler code inline.
    pub fn enqueue(&self, job: Job) {
        let mut queue = self.inner.queue.lock().expect("job queue lock poisoned");
        queue.pending.push_back(job);
        drop(queue);

        self.inner.notify.notify_one();
    }

    /// Number of jobs waiting for admission.
    pub fn pending_len(&self) -> usize {
        self.inner
            .queue
            .lock()
            .expect("job queue lock poisoned")
            .pending
            .len()
    }

    /// Whether a job currently holds the execution slot.
    pub fn is_processing(&self) -> bool {
        self.inner
            .queue
            .lock()
            .expect("job queue lock poisoned")
            .status
            == QueueStatus::Processing
    }

    /// Completed-job totals.
    pub fn counters(&self) -> CountersSnapshot {
        let counters = &self.inner.counters;
        CountersSnapshot {
            total: counters.total.load(Ordering::Relaxed),
            success: counters.success.load(Ordering::Relaxed),
            error: counters.error.load(Ordering::Relaxed),
        }
    }
}

/// The dispatcher. Owns the engine handle and the pending-job sequence.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Build a scheduler and its enqueue handle.
    pub fn new(
        config: ServiceConfig,
        engine: Arc<dyn RenderEngine>,
        policy: FailurePolicy,
    ) -> (Self, SchedulerHandle) {
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(JobQueue {
                pending: VecDeque::new(),
                status: QueueStatus::Ready,
            }),
            notify: Notify::new(),
            engine,
            config,
            policy,
            counters: JobCounters::default(),
        });

        (
            Self {
                inner: inner.clone(),
            },
            SchedulerHandle { inner },
        )
    }

    /// Run the dispatch loop forever.
    ///
    /// Spawn this once at startup; it admits, executes, and completes
    /// jobs one at a time.
    pub async fn run(self) {
        loop {
            let job = self.next_job().await;
            self.execute(job).await;

            // Next admission happens on a fresh scheduling tick.
            tokio::task::yield_now().await;
        }
    }

    /// Wait until a job can be admitted.
    async fn next_job(&self) -> Job {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);

            // Register interest before checking, so an enqueue between
            // the check and the await still wakes us.
            notified.as_mut().enable();

            if let Some(job) = self.inner.try_admit() {
                return job;
            }

            notified.await;
        }
    }

    /// Execute one admitted job and complete it.
    async fn execute(&self, job: Job) {
        self.inner.counters.total.fetch_add(1, Ordering::Relaxed);

        let outcome = AssertUnwindSafe(self.process(&job)).catch_unwind().await;

        // Slot is freed unconditionally, before completion handling.
        self.inner.release_slot();

        match outcome {
            Ok(Ok(())) => {
                self.inner.counters.success.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(err)) => {
                self.inner.counters.error.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    job_id = %job.id,
                    conn_uid = job.conn.uid(),
                    error = %err,
                    "job failed, closing connection"
                );
                job.conn.close();
            }
            Err(panic) => {
                self.inner.counters.error.fetch_add(1, Ordering::Relaxed);
                job.conn.close();
                let detail = panic_detail(panic);
                self.inner.policy.unmodeled_failure(&job.id, &detail);
            }
        }
    }

    /// Merge config, run the handler, send the reply.
    async fn process(&self, job: &Job) -> Result<()> {
        let cfg = ShotConfig::merge(&self.inner.config, &job.id, &job.overrides);
        let ctx = ActionContext {
            engine: self.inner.engine.as_ref(),
        };

        let reply = job.action.dispatch(&ctx, &cfg).await?;

        match reply {
            Reply::Json { kind, body } => job.conn.send_json(kind, &body).await,
            Reply::FileStream(path) => job.conn.send_file(&path).await,
        }
    }
}

fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
