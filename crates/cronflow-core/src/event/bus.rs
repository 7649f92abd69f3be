//! Broadcast channel for run lifecycle events.
//!
//! `EventBus` turns executor callbacks into [`CronEvent`]s and fans them out
//! over `tokio::sync::broadcast`. Publishing with no subscribers drops the
//! event; a slow subscriber lags instead of blocking the executor.

use cronflow_types::event::CronEvent;
use cronflow_types::job::CronJob;
use cronflow_types::run::{CronJobRun, NodeStatus};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::workflow::observer::RunObserver;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Multi-consumer bus for [`CronEvent`]s. Clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CronEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CronEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: CronEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

impl RunObserver for EventBus {
    fn on_run_started(&self, job: &CronJob, run: &CronJobRun) {
        self.publish(CronEvent::RunStarted {
            job_id: job.id,
            job_name: job.name.clone(),
            run_id: run.id,
            started_at: run.started_at,
        });
    }

    fn on_node_status(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        node_id: &str,
        status: NodeStatus,
        error: Option<&str>,
    ) {
        self.publish(CronEvent::NodeStatus {
            job_id,
            run_id,
            node_id: node_id.to_string(),
            status,
            error: error.map(str::to_string),
        });
    }

    fn on_run_completed(&self, job: &CronJob, run: &CronJobRun) {
        let duration_ms = run
            .completed_at
            .map(|end| (end - run.started_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        self.publish(CronEvent::RunCompleted {
            job_id: job.id,
            run_id: run.id,
            status: run.status,
            duration_ms,
        });
    }
}
