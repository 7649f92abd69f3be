//! Run lifecycle observers.
//!
//! The executor reports progress through [`RunObserver`] instead of talking
//! to any UI directly. Callbacks are synchronous and must not block; forward
//! to a channel (see `EventBus`) for anything slow.

use std::sync::Arc;

use cronflow_types::job::CronJob;
use cronflow_types::run::{CronJobRun, NodeStatus};
use uuid::Uuid;

/// Receives run lifecycle callbacks from the wave executor.
pub trait RunObserver: Send + Sync {
    /// The run record was created with status `running`.
    fn on_run_started(&self, job: &CronJob, run: &CronJobRun);

    /// A node moved to `running` or to a terminal status.
    fn on_node_status(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        node_id: &str,
        status: NodeStatus,
        error: Option<&str>,
    );

    /// The run was finalized.
    fn on_run_completed(&self, job: &CronJob, run: &CronJobRun);
}

/// Ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn on_run_started(&self, _job: &CronJob, _run: &CronJobRun) {}

    fn on_node_status(
        &self,
        _job_id: Uuid,
        _run_id: Uuid,
        _node_id: &str,
        _status: NodeStatus,
        _error: Option<&str>,
    ) {
    }

    fn on_run_completed(&self, _job: &CronJob, _run: &CronJobRun) {}
}

/// Logs every callback through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_run_started(&self, job: &CronJob, run: &CronJobRun) {
        tracing::info!(
            job_id = %job.id,
            job_name = %job.name,
            run_id = %run.id,
            "run started"
        );
    }

    fn on_node_status(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        node_id: &str,
        status: NodeStatus,
        error: Option<&str>,
    ) {
        match error {
            Some(error) => tracing::warn!(%job_id, %run_id, node_id, %status, error, "node finished"),
            None => tracing::debug!(%job_id, %run_id, node_id, %status, "node status"),
        }
    }

    fn on_run_completed(&self, job: &CronJob, run: &CronJobRun) {
        tracing::info!(
            job_id = %job.id,
            run_id = %run.id,
            status = %run.status,
            succeeded = run.count(NodeStatus::Success),
            failed = run.count(NodeStatus::Failed),
            skipped = run.count(NodeStatus::Skipped),
            "run completed"
        );
    }
}

/// Forwards every callback to each contained observer, in order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl RunObserver for ObserverSet {
    fn on_run_started(&self, job: &CronJob, run: &CronJobRun) {
        for observer in &self.observers {
            observer.on_run_started(job, run);
        }
    }

    fn on_node_status(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        node_id: &str,
        status: NodeStatus,
        error: Option<&str>,
    ) {
        for observer in &self.observers {
            observer.on_node_status(job_id, run_id, node_id, status, error);
        }
    }

    fn on_run_completed(&self, job: &CronJob, run: &CronJobRun) {
        for observer in &self.observers {
            observer.on_run_completed(job, run);
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}
