// ABOUTME: Async job lifecycle: worker pool abstraction and job table
// ABOUTME: Implements in_progress -> completed/failed with at-most-once asyncGet

//! Async RPC job lifecycle.
//!
//! A job is `in_progress` until its task completes, then `completed` or
//! `failed`. `asyncProbe` never mutates state; the first successful
//! `asyncGet` removes the job (at-most-once retrieval) and every later
//! `asyncGet`/`asyncProbe` for that id sees an unknown job.

use crate::error::{Result, TarpError};
use crate::registry::{BoxFuture, HandlerOutput};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};
use uuid::Uuid;

/// Where a job currently stands, as observable from `asyncProbe`. Success vs.
/// failure is only distinguished once `asyncGet` retrieves the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Done,
}

/// A handle to a spawned job's eventual outcome, written by the worker pool
/// once the task finishes. `peek` never consumes it; `take` does.
#[derive(Clone)]
pub struct JobOutcomeHandle {
    outcome: Arc<Mutex<Option<std::result::Result<HandlerOutput, TarpError>>>>,
}

impl JobOutcomeHandle {
    /// `None` if still running, `Some(true)` if completed successfully,
    /// `Some(false)` if it failed. Does not consume the outcome.
    async fn peek_is_success(&self) -> Option<bool> {
        self.outcome.lock().await.as_ref().map(|r| r.is_ok())
    }

    /// Remove and return the outcome, if it has landed.
    async fn take(&self) -> Option<std::result::Result<HandlerOutput, TarpError>> {
        self.outcome.lock().await.take()
    }
}

/// Abstraction over where a submitted RPC actually runs. The trait is
/// public so a process-pool backend can be added later without touching
/// dispatch; this crate ships only [`TokioWorkerPool`] — a process-pool
/// backend needs a cross-process serialization boundary equivalent to
/// Python's `pickle`, which has no portable analogue here, so it is out of
/// scope for this port (see DESIGN.md).
pub trait WorkerPool: Send + Sync {
    fn submit(&self, future: BoxFuture<'static, Result<HandlerOutput>>) -> JobOutcomeHandle;
}

/// Bounded Tokio-task worker pool: the idiomatic analogue of the Python
/// reference's thread pool, using a semaphore to cap concurrency instead of
/// managing threads directly.
pub struct TokioWorkerPool {
    semaphore: Arc<Semaphore>,
}

impl TokioWorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, future: BoxFuture<'static, Result<HandlerOutput>>) -> JobOutcomeHandle {
        let outcome = Arc::new(Mutex::new(None));
        let outcome_writer = outcome.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("worker pool semaphore is never closed");
            let result = future.await;
            *outcome_writer.lock().await = Some(result);
        });

        JobOutcomeHandle { outcome }
    }
}

struct AsyncJob {
    suggested_wait: u64,
    submitted_at: Instant,
    outcome: JobOutcomeHandle,
}

/// Growth controls for the job table. `ttl: None` disables the background
/// sweep entirely — the distilled spec says not to guess intent beyond
/// adding the sweep behind a default-off flag, so that is exactly what this
/// does.
#[derive(Debug, Clone)]
pub struct JobTableConfig {
    pub ttl: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for JobTableConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// `Arc<RwLock<HashMap<Uuid, AsyncJob>>>` providing linearizable
/// insert/probe/get. Cheap to clone; every clone shares the same table.
#[derive(Clone)]
pub struct JobTable {
    jobs: Arc<RwLock<HashMap<Uuid, AsyncJob>>>,
    config: Arc<JobTableConfig>,
}

impl JobTable {
    pub fn new(config: JobTableConfig) -> Self {
        let table = Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        };
        table.clone().spawn_reaper_if_configured();
        table
    }

    fn spawn_reaper_if_configured(self) {
        let Some(ttl) = self.config.ttl else {
            return;
        };
        let jobs = self.jobs.clone();
        let sweep_interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                let mut jobs = jobs.write().await;
                let before = jobs.len();
                jobs.retain(|_, job| job.submitted_at.elapsed() < ttl);
                let reaped = before - jobs.len();
                if reaped > 0 {
                    tracing::debug!(reaped, "swept stale async jobs");
                }
            }
        });
    }

    /// Submit a future to run on `pool`, returning the new job's id.
    pub async fn submit(
        &self,
        pool: &dyn WorkerPool,
        suggested_wait: u64,
        future: BoxFuture<'static, Result<HandlerOutput>>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let outcome = pool.submit(future);
        let job = AsyncJob {
            suggested_wait,
            submitted_at: Instant::now(),
            outcome,
        };
        self.jobs.write().await.insert(id, job);
        id
    }

    /// Non-destructive status check. Returns the job's status alongside its
    /// `suggested_wait`, since `asyncProbe` reports both regardless of
    /// whether the job is still running.
    pub async fn probe(&self, id: Uuid) -> Result<(JobStatus, u64)> {
        let jobs = self.jobs.read().await;
        let job = jobs
            .get(&id)
            .ok_or_else(|| TarpError::registry(format!("unknown async job: {id}")))?;
        let status = match job.outcome.peek_is_success().await {
            None => JobStatus::InProgress,
            Some(_) => JobStatus::Done,
        };
        Ok((status, job.suggested_wait))
    }

    /// At-most-once retrieval: removes the job on the first call that sees
    /// a landed outcome (success or failure). Held under a single write
    /// lock for the duration so concurrent `get`s on the same id can't both
    /// observe the outcome as still-pending.
    pub async fn get(&self, id: Uuid) -> Result<HandlerOutput> {
        let mut jobs = self.jobs.write().await;
        let suggested_wait = jobs
            .get(&id)
            .ok_or_else(|| TarpError::registry(format!("unknown async job: {id}")))?
            .suggested_wait;

        let outcome = jobs.get(&id).unwrap().outcome.take().await;
        match outcome {
            None => Err(TarpError::operation_in_progress(
                format!("job {id} is still running"),
                Some(suggested_wait),
            )),
            Some(Ok(output)) => {
                jobs.remove(&id);
                Ok(output)
            }
            Some(Err(err)) => {
                jobs.remove(&id);
                Err(err)
            }
        }
    }
}
