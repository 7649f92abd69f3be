//! Wave executor: runs one job's workflow graph to completion.
//!
//! The `WaveExecutor` compiles the graph into waves and processes them in
//! order. Nodes within a wave run concurrently via `tokio::JoinSet`; the
//! executor waits for the whole wave before looking at the next one.
//!
//! # Execution flow
//!
//! 1. Create a `CronJobRun` in `running` state and notify observers.
//! 2. Compile waves with [`compile_waves`].
//! 3. For each wave: if an earlier wave had a failure, record every node as
//!    `skipped`; otherwise dispatch all nodes and wait for them.
//! 4. Aggregate node statuses into the run status.
//! 5. Append the run to history, record `last_run_*` on the job, notify
//!    observers of completion.
//!
//! Node failures (backend errors, unknown node types, panicking dispatch
//! tasks) are captured on the node and never returned from [`WaveExecutor::run`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cronflow_types::error::StoreError;
use cronflow_types::job::{CronJob, CronJobPatch};
use cronflow_types::run::{CronJobRun, NodeExecutionResult, NodeStatus, RunStatus};
use cronflow_types::workflow::{NodeKind, WorkflowNode};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::repository::JobRepository;

use super::backend::{AgentLaunchRequest, LoopLaunchRequest, NodeBackends, ShellRequest};
use super::dag::compile_waves;
use super::observer::RunObserver;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Timeout for shell nodes that do not set their own (5 minutes).
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned by [`WaveExecutor::run`].
///
/// Only persistence can fail a run from the caller's point of view; the
/// finished run travels with the error so it is not lost.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to persist run {} for job {job_id}: {source}", .run.id)]
    Persist {
        job_id: Uuid,
        run: Box<CronJobRun>,
        #[source]
        source: StoreError,
    },
}

impl ExecutorError {
    /// The finished run, even though it could not be stored.
    pub fn run(&self) -> &CronJobRun {
        match self {
            ExecutorError::Persist { run, .. } => run,
        }
    }
}

// ---------------------------------------------------------------------------
// WaveExecutor
// ---------------------------------------------------------------------------

/// Executes workflow graphs wave by wave.
pub struct WaveExecutor<R: JobRepository> {
    repo: Arc<R>,
    backends: NodeBackends,
    observer: Arc<dyn RunObserver>,
    default_shell_timeout: Duration,
}

impl<R: JobRepository> WaveExecutor<R> {
    pub fn new(repo: Arc<R>, backends: NodeBackends, observer: Arc<dyn RunObserver>) -> Self {
        Self {
            repo,
            backends,
            observer,
            default_shell_timeout: Duration::from_secs(DEFAULT_SHELL_TIMEOUT_SECS),
        }
    }

    /// Timeout for shell nodes whose `timeout` is unset.
    pub fn with_default_shell_timeout(mut self, timeout: Duration) -> Self {
        self.default_shell_timeout = timeout;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Run `job`'s workflow once and persist the result.
    #[tracing::instrument(name = "cron_run", skip_all, fields(job_id = %job.id))]
    pub async fn run(&self, job: &CronJob) -> Result<CronJobRun, ExecutorError> {
        let mut run = CronJobRun::start(job.id, Utc::now());
        tracing::info!(job_id = %job.id, run_id = %run.id, job_name = %job.name, "run starting");
        self.observer.on_run_started(job, &run);

        let waves = compile_waves(&job.workflow_graph);
        let mut wave_failed = false;

        for (wave_idx, wave) in waves.iter().enumerate() {
            if wave_failed {
                tracing::debug!(
                    job_id = %job.id,
                    run_id = %run.id,
                    wave = wave_idx,
                    nodes = wave.len(),
                    "skipping wave after earlier failure"
                );
                for node in wave {
                    self.observer
                        .on_node_status(job.id, run.id, &node.id, NodeStatus::Skipped, None);
                    run.node_results
                        .insert(node.id.clone(), NodeExecutionResult::skipped(&node.id));
                }
                continue;
            }

            tracing::debug!(
                job_id = %job.id,
                run_id = %run.id,
                wave = wave_idx,
                nodes = wave.len(),
                "dispatching wave"
            );

            for result in self.dispatch_wave(job.id, run.id, wave).await {
                if result.status == NodeStatus::Failed {
                    wave_failed = true;
                }
                run.node_results.insert(result.node_id.clone(), result);
            }
        }

        run.status = aggregate_status(&run);
        run.completed_at = Some(Utc::now());

        let persisted = self.persist(job, &run).await;
        self.observer.on_run_completed(job, &run);

        match persisted {
            Ok(()) => {
                tracing::info!(
                    job_id = %job.id,
                    run_id = %run.id,
                    status = %run.status,
                    "run finished"
                );
                Ok(run)
            }
            Err(source) => {
                tracing::error!(
                    job_id = %job.id,
                    run_id = %run.id,
                    error = %source,
                    "failed to persist run"
                );
                Err(ExecutorError::Persist {
                    job_id: job.id,
                    run: Box::new(run),
                    source,
                })
            }
        }
    }

    /// Spawn every node of one wave and wait for all of them.
    async fn dispatch_wave(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        wave: &[&WorkflowNode],
    ) -> Vec<NodeExecutionResult> {
        let mut join_set = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, (String, DateTime<Utc>)> = HashMap::new();

        for node in wave {
            let dispatch = NodeDispatch {
                job_id,
                run_id,
                backends: self.backends.clone(),
                observer: Arc::clone(&self.observer),
                default_shell_timeout: self.default_shell_timeout,
            };
            let node = (*node).clone();
            let node_id = node.id.clone();
            let span = tracing::info_span!("node", node_id = %node_id, node_type = node.type_name());
            let handle = join_set.spawn(async move { dispatch.run(node).await }.instrument(span));
            spawned.insert(handle.id(), (node_id, Utc::now()));
        }

        let mut results = Vec::with_capacity(wave.len());
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, result)) => results.push(result),
                Err(join_err) => {
                    let Some((node_id, started_at)) = spawned.remove(&join_err.id()) else {
                        tracing::error!(%job_id, %run_id, error = %join_err, "unidentified node task failed");
                        continue;
                    };
                    let error = if join_err.is_panic() {
                        "node task panicked".to_string()
                    } else {
                        format!("node task aborted: {join_err}")
                    };
                    tracing::error!(%job_id, %run_id, node_id = %node_id, %error, "node task failed");
                    self.observer.on_node_status(
                        job_id,
                        run_id,
                        &node_id,
                        NodeStatus::Failed,
                        Some(&error),
                    );
                    results.push(NodeExecutionResult {
                        node_id,
                        status: NodeStatus::Failed,
                        started_at: Some(started_at),
                        completed_at: Some(Utc::now()),
                        output: None,
                        error: Some(error),
                    });
                }
            }
        }
        results
    }

    async fn persist(&self, job: &CronJob, run: &CronJobRun) -> Result<(), StoreError> {
        self.repo.append_run(&job.id, run.clone()).await?;
        let finished_at = run.completed_at.unwrap_or(run.started_at);
        if self
            .repo
            .update(&job.id, CronJobPatch::last_run(finished_at, run.status))
            .await?
            .is_none()
        {
            tracing::debug!(job_id = %job.id, "job deleted during run; last-run summary not recorded");
        }
        Ok(())
    }
}

impl<R: JobRepository> std::fmt::Debug for WaveExecutor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveExecutor")
            .field("default_shell_timeout", &self.default_shell_timeout)
            .finish_non_exhaustive()
    }
}

/// Overall run status from node outcomes. Skipped nodes count as neither
/// success nor failure.
pub fn aggregate_status(run: &CronJobRun) -> RunStatus {
    let succeeded = run.count(NodeStatus::Success) > 0;
    let failed = run.count(NodeStatus::Failed) > 0;
    match (succeeded, failed) {
        (true, true) => RunStatus::Partial,
        (false, true) => RunStatus::Failed,
        _ => RunStatus::Success,
    }
}

// ---------------------------------------------------------------------------
// Per-node dispatch
// ---------------------------------------------------------------------------

/// Everything one spawned node task needs, owned so the task is `'static`.
struct NodeDispatch {
    job_id: Uuid,
    run_id: Uuid,
    backends: NodeBackends,
    observer: Arc<dyn RunObserver>,
    default_shell_timeout: Duration,
}

impl NodeDispatch {
    async fn run(self, node: WorkflowNode) -> NodeExecutionResult {
        self.observer
            .on_node_status(self.job_id, self.run_id, &node.id, NodeStatus::Running, None);
        let started_at = Utc::now();

        let outcome = self.call_backend(node.kind).await;
        let completed_at = Utc::now();

        let (status, output, error) = match outcome {
            Ok(output) => (NodeStatus::Success, output, None),
            Err(error) => (NodeStatus::Failed, None, Some(error)),
        };
        self.observer.on_node_status(
            self.job_id,
            self.run_id,
            &node.id,
            status,
            error.as_deref(),
        );

        NodeExecutionResult {
            node_id: node.id,
            status,
            started_at: Some(started_at),
            completed_at: Some(completed_at),
            output,
            error,
        }
    }

    /// Call the collaborator for `kind`. `Ok` carries the node's output text.
    async fn call_backend(&self, kind: NodeKind) -> Result<Option<String>, String> {
        match kind {
            NodeKind::HeadlessAgent(data) => self
                .backends
                .headless_agent
                .start_boxed(AgentLaunchRequest {
                    reference_agent_id: data.reference_agent_id,
                    prompt: data.prompt,
                    model: data.model,
                })
                .await
                .map(|handle| Some(format!("Started headless agent session {}", handle.id)))
                .map_err(|e| e.to_string()),

            NodeKind::RalphLoop(data) => self
                .backends
                .ralph_loop
                .start_boxed(LoopLaunchRequest {
                    prompt: data.prompt,
                    completion_phrase: data.completion_phrase,
                    max_iterations: data.max_iterations,
                    model: data.model,
                    reference_agent_id: data.reference_agent_id,
                })
                .await
                .map(|handle| Some(format!("Started ralph loop {}", handle.id)))
                .map_err(|e| e.to_string()),

            NodeKind::ShellCommand(data) => {
                let timeout = data
                    .timeout
                    .map(Duration::from_secs)
                    .unwrap_or(self.default_shell_timeout);
                let cwd = data
                    .working_directory
                    .filter(|dir| !dir.trim().is_empty())
                    .map(PathBuf::from);
                self.backends
                    .shell
                    .exec_boxed(ShellRequest {
                        command: data.command,
                        cwd,
                        timeout,
                    })
                    .await
                    .map(|out| {
                        let stdout = out.stdout.trim();
                        (!stdout.is_empty()).then(|| stdout.to_string())
                    })
                    .map_err(|e| e.to_string())
            }

            NodeKind::Unknown { node_type, .. } => Err(format!("unknown node type: {node_type}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
