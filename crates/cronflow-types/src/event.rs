//! Event types for the cronflow run event bus.
//!
//! `CronEvent` is broadcast while a job runs. All variants are Clone + Send +
//! Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::run::{NodeStatus, RunStatus};

/// Lifecycle events emitted by the wave executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CronEvent {
    /// A job fired (or was forced) and its run record was created.
    RunStarted {
        job_id: Uuid,
        job_name: String,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    },

    /// A node changed status (running, then a terminal status).
    NodeStatus {
        job_id: Uuid,
        run_id: Uuid,
        node_id: String,
        status: NodeStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// All waves finished and the run was finalized.
    RunCompleted {
        job_id: Uuid,
        run_id: Uuid,
        status: RunStatus,
        duration_ms: u64,
    },
}

impl CronEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            CronEvent::RunStarted { job_id, .. }
            | CronEvent::NodeStatus { job_id, .. }
            | CronEvent::RunCompleted { job_id, .. } => *job_id,
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            CronEvent::RunStarted { run_id, .. }
            | CronEvent::NodeStatus { run_id, .. }
            | CronEvent::RunCompleted { run_id, .. } => *run_id,
        }
    }
}
