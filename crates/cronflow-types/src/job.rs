//! Cron job definitions and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::run::RunStatus;
use crate::workflow::WorkflowGraph;

/// A named, schedulable workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// UUIDv7 assigned at creation. Never changes.
    pub id: Uuid,
    pub name: String,
    /// Five-field cron expression (minute hour day-of-month month day-of-week).
    pub schedule: String,
    pub enabled: bool,
    pub workflow_graph: WorkflowGraph,
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation.
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<RunStatus>,
}

/// Input for creating a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCronJob {
    pub name: String,
    pub schedule: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub workflow_graph: WorkflowGraph,
}

fn default_enabled() -> bool {
    true
}

impl NewCronJob {
    /// Materialize a job with a fresh id and timestamps.
    pub fn into_job(self, now: DateTime<Utc>) -> CronJob {
        CronJob {
            id: Uuid::now_v7(),
            name: self.name,
            schedule: self.schedule,
            enabled: self.enabled,
            workflow_graph: self.workflow_graph,
            created_at: now,
            updated_at: now,
            last_run_at: None,
            last_run_status: None,
        }
    }
}

/// A partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_graph: Option<WorkflowGraph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<RunStatus>,
}

impl CronJobPatch {
    /// Patch recording the outcome of the most recent run.
    pub fn last_run(at: DateTime<Utc>, status: RunStatus) -> Self {
        Self {
            last_run_at: Some(at),
            last_run_status: Some(status),
            ..Self::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Merge into `job` and bump `updated_at`.
    pub fn apply(self, job: &mut CronJob, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            job.name = name;
        }
        if let Some(schedule) = self.schedule {
            job.schedule = schedule;
        }
        if let Some(enabled) = self.enabled {
            job.enabled = enabled;
        }
        if let Some(graph) = self.workflow_graph {
            job.workflow_graph = graph;
        }
        if let Some(at) = self.last_run_at {
            job.last_run_at = Some(at);
        }
        if let Some(status) = self.last_run_status {
            job.last_run_status = Some(status);
        }
        job.updated_at = now;
    }
}
