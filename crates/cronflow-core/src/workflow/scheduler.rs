//! Cron scheduler: arms one timer per enabled job and fires runs.
//!
//! Provides:
//! - Per-job timer lifecycle (arm, unarm, reschedule) driven by [`next_run`]
//! - At most one in-flight run per job (`trigger` is a no-op while one runs)
//! - Re-arming after each fire from the job's freshly loaded definition
//! - Bounded shutdown drain of in-flight runs
//!
//! All state lives on the `Scheduler` instance; clones share it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use cronflow_types::error::StoreError;
use cronflow_types::job::CronJob;
use cronflow_types::run::CronJobRun;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::cron::next_run;
use crate::repository::JobRepository;

use super::executor::{ExecutorError, WaveExecutor};

/// Default bound on the shutdown drain.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during scheduling operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Result of [`Scheduler::trigger`].
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// The run finished and was persisted.
    Completed(Box<CronJobRun>),
    /// A run for this job is already in flight; nothing was started.
    AlreadyRunning,
    /// No job with this id exists.
    NotFound,
    /// The scheduler is shutting down; nothing was started.
    ShuttingDown,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct ArmedTimer {
    /// Distinguishes this arming from later ones for the same job.
    generation: u64,
    next_run: DateTime<Utc>,
    handle: AbortHandle,
}

struct SchedulerState<R: JobRepository> {
    executor: WaveExecutor<R>,
    timers: DashMap<Uuid, ArmedTimer>,
    /// Job id -> time its current run started.
    in_flight: DashMap<Uuid, DateTime<Utc>>,
    generation: AtomicU64,
    shutting_down: CancellationToken,
    runs: TaskTracker,
    shutdown_timeout: Duration,
}

/// Owns every job timer and the in-flight run registry.
pub struct Scheduler<R: JobRepository + 'static> {
    state: Arc<SchedulerState<R>>,
}

impl<R: JobRepository + 'static> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

/// Removes a job from the in-flight registry when its run ends, including
/// when the run future is dropped or panics.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<Uuid, DateTime<Utc>>,
    job_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.job_id);
    }
}

impl<R: JobRepository + 'static> Scheduler<R> {
    /// `shutdown_timeout` bounds how long [`shutdown`](Self::shutdown) waits
    /// for in-flight runs.
    pub fn new(executor: WaveExecutor<R>, shutdown_timeout: Duration) -> Self {
        Self {
            state: Arc::new(SchedulerState {
                executor,
                timers: DashMap::new(),
                in_flight: DashMap::new(),
                generation: AtomicU64::new(0),
                shutting_down: CancellationToken::new(),
                runs: TaskTracker::new(),
                shutdown_timeout,
            }),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        self.state.executor.repository()
    }

    /// Load every job and arm the enabled ones. Returns how many were armed.
    pub async fn start(&self) -> Result<usize, SchedulerError> {
        let jobs = self.repository().load_all().await?;
        let mut armed = 0;
        for job in jobs.iter().filter(|job| job.enabled) {
            if self.arm(job) {
                armed += 1;
            }
        }
        tracing::info!(jobs = jobs.len(), armed, "scheduler started");
        Ok(armed)
    }

    /// Arm a timer for the job's next scheduled instant, replacing any
    /// existing timer. Returns whether a timer is now pending.
    ///
    /// No-op for disabled jobs, after shutdown began, when the schedule has
    /// no run within the search window, or when the computed delay is not
    /// positive.
    pub fn arm(&self, job: &CronJob) -> bool {
        if self.state.shutting_down.is_cancelled() {
            tracing::debug!(job_id = %job.id, "not arming: scheduler is shutting down");
            return false;
        }
        if !job.enabled {
            return false;
        }

        self.unarm(&job.id);

        let now = Local::now();
        let Some(next) = next_run(&job.schedule, &now) else {
            tracing::warn!(
                job_id = %job.id,
                schedule = %job.schedule,
                "schedule is invalid or has no run within 48 hours; job not armed"
            );
            return false;
        };
        let delay = match (next - now).to_std() {
            Ok(delay) if !delay.is_zero() => delay,
            _ => {
                tracing::debug!(job_id = %job.id, next_run = %next, "non-positive delay; not arming");
                return false;
            }
        };

        let generation = self.state.generation.fetch_add(1, Ordering::Relaxed);
        let job_id = job.id;

        // Hold the map slot while spawning so the timer can never fire before
        // its entry exists.
        let slot = self.state.timers.entry(job_id);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire(job_id, generation).await;
        });
        slot.insert(ArmedTimer {
            generation,
            next_run: next.with_timezone(&Utc),
            handle: handle.abort_handle(),
        });

        tracing::info!(
            job_id = %job_id,
            next_run = %next,
            delay_secs = delay.as_secs(),
            "job armed"
        );
        true
    }

    /// Cancel a pending timer. Returns whether one existed.
    pub fn unarm(&self, job_id: &Uuid) -> bool {
        match self.state.timers.remove(job_id) {
            Some((_, timer)) => {
                timer.handle.abort();
                tracing::debug!(job_id = %job_id, "job unarmed");
                true
            }
            None => false,
        }
    }

    /// Arm if enabled, unarm otherwise. Call after any store mutation.
    pub fn reschedule(&self, job: &CronJob) -> bool {
        if job.enabled {
            self.arm(job)
        } else {
            self.unarm(&job.id);
            false
        }
    }

    /// Pending timers as (job id, next fire instant), soonest first.
    pub fn armed_jobs(&self) -> Vec<(Uuid, DateTime<Utc>)> {
        let mut armed: Vec<(Uuid, DateTime<Utc>)> = self
            .state
            .timers
            .iter()
            .map(|entry| (*entry.key(), entry.value().next_run))
            .collect();
        armed.sort_by_key(|(_, at)| *at);
        armed
    }

    pub fn is_running(&self, job_id: &Uuid) -> bool {
        self.state.in_flight.contains_key(job_id)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.shutting_down.is_cancelled()
    }

    /// Run the job now unless a run for it is already in flight.
    pub async fn trigger(&self, job_id: Uuid) -> Result<TriggerOutcome, SchedulerError> {
        if self.state.shutting_down.is_cancelled() {
            return Ok(TriggerOutcome::ShuttingDown);
        }

        match self.state.in_flight.entry(job_id) {
            Entry::Occupied(_) => {
                tracing::debug!(job_id = %job_id, "run already in flight; trigger ignored");
                return Ok(TriggerOutcome::AlreadyRunning);
            }
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
            }
        }
        let _guard = InFlightGuard {
            in_flight: &self.state.in_flight,
            job_id,
        };

        let Some(job) = self.repository().load(&job_id).await? else {
            tracing::debug!(job_id = %job_id, "trigger for unknown job");
            return Ok(TriggerOutcome::NotFound);
        };

        let run = self
            .state
            .runs
            .track_future(self.state.executor.run(&job))
            .await?;
        Ok(TriggerOutcome::Completed(Box::new(run)))
    }

    /// Timer callback: drop this timer's entry, run the job, then re-arm it
    /// from its current definition.
    async fn fire(&self, job_id: Uuid, generation: u64) {
        self.state
            .timers
            .remove_if(&job_id, |_, timer| timer.generation == generation);

        tracing::info!(job_id = %job_id, "job fired");
        match self.trigger(job_id).await {
            Ok(TriggerOutcome::Completed(run)) => {
                tracing::debug!(job_id = %job_id, run_id = %run.id, status = %run.status, "scheduled run done");
            }
            Ok(TriggerOutcome::AlreadyRunning) => {}
            Ok(TriggerOutcome::NotFound) => {
                tracing::debug!(job_id = %job_id, "job deleted before it fired");
                return;
            }
            Ok(TriggerOutcome::ShuttingDown) => return,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "scheduled run failed");
            }
        }

        match self.repository().load(&job_id).await {
            Ok(Some(job)) => {
                self.arm(&job);
            }
            Ok(None) => tracing::debug!(job_id = %job_id, "job deleted during run; not re-arming"),
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "failed to reload job; not re-arming")
            }
        }
    }

    /// Stop arming, cancel pending timers and wait for in-flight runs up to
    /// the shutdown timeout. Returns `true` if every run settled in time;
    /// runs still going after the timeout are left to finish unobserved.
    pub async fn shutdown(&self) -> bool {
        self.state.shutting_down.cancel();

        let mut cancelled = 0;
        self.state.timers.retain(|_, timer| {
            timer.handle.abort();
            cancelled += 1;
            false
        });

        self.state.runs.close();
        let in_flight = self.state.runs.len();
        tracing::info!(timers = cancelled, in_flight, "scheduler shutting down");

        match tokio::time::timeout(self.state.shutdown_timeout, self.state.runs.wait()).await {
            Ok(()) => {
                tracing::info!("scheduler drained");
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.state.shutdown_timeout.as_secs(),
                    still_running = self.state.runs.len(),
                    "shutdown timed out waiting for in-flight runs"
                );
                false
            }
        }
    }
}

impl<R: JobRepository + 'static> std::fmt::Debug for Scheduler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("armed", &self.state.timers.len())
            .field("in_flight", &self.state.in_flight.len())
            .field("shutting_down", &self.state.shutting_down.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
