//! In-crate fakes shared by the executor and scheduler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use cronflow_types::error::StoreError;
use cronflow_types::job::{CronJob, CronJobPatch, NewCronJob};
use cronflow_types::run::{CronJobRun, NodeStatus};
use cronflow_types::workflow::{
    NodeKind, ShellCommandNode, WorkflowEdge, WorkflowGraph, WorkflowNode,
};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::repository::JobRepository;
use crate::workflow::backend::{
    AgentLaunchRequest, BackendError, HeadlessAgentLauncher, LaunchHandle, LoopLaunchRequest,
    LoopLauncher, ShellExecutor, ShellOutput, ShellRequest,
};
use crate::workflow::observer::RunObserver;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn shell_node(id: &str, command: &str) -> WorkflowNode {
    WorkflowNode::new(
        id,
        NodeKind::ShellCommand(ShellCommandNode {
            command: command.to_string(),
            ..Default::default()
        }),
    )
}

pub fn sample_job(nodes: Vec<WorkflowNode>, edges: Vec<(&str, &str)>) -> CronJob {
    NewCronJob {
        name: "sample".to_string(),
        schedule: "* * * * *".to_string(),
        enabled: true,
        workflow_graph: WorkflowGraph {
            nodes,
            edges: edges
                .into_iter()
                .map(|(s, t)| WorkflowEdge::new(s, t))
                .collect(),
        },
    }
    .into_job(Utc::now())
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<Uuid, CronJob>>,
    runs: Mutex<HashMap<Uuid, Vec<CronJobRun>>>,
    fail_appends: AtomicBool,
}

impl InMemoryJobRepository {
    pub fn with_jobs(jobs: impl IntoIterator<Item = CronJob>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.jobs.lock().unwrap();
            for job in jobs {
                map.insert(job.id, job);
            }
        }
        repo
    }

    pub fn fail_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }

    pub fn runs_of(&self, job_id: &Uuid) -> Vec<CronJobRun> {
        self.runs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn job(&self, id: &Uuid) -> Option<CronJob> {
        self.jobs.lock().unwrap().get(id).cloned()
    }
}

impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: NewCronJob) -> Result<CronJob, StoreError> {
        let job = job.into_job(Utc::now());
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn load(&self, id: &Uuid) -> Result<Option<CronJob>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn load_all(&self) -> Result<Vec<CronJob>, StoreError> {
        let mut jobs: Vec<CronJob> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn update(&self, id: &Uuid, patch: CronJobPatch) -> Result<Option<CronJob>, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs.get_mut(id).map(|job| {
            patch.apply(job, Utc::now());
            job.clone()
        }))
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        self.runs.lock().unwrap().remove(id);
        Ok(self.jobs.lock().unwrap().remove(id).is_some())
    }

    async fn append_run(&self, job_id: &Uuid, run: CronJobRun) -> Result<(), StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        if !self.jobs.lock().unwrap().contains_key(job_id) {
            return Ok(());
        }
        self.runs
            .lock()
            .unwrap()
            .entry(*job_id)
            .or_default()
            .push(run);
        Ok(())
    }

    async fn list_runs(&self, job_id: &Uuid) -> Result<Vec<CronJobRun>, StoreError> {
        Ok(self.runs_of(job_id))
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Shell fake driven by the command text:
/// - `fail` -> error "boom"
/// - `panic` -> panics inside the dispatch task
/// - `gate` -> waits for a permit from [`ScriptedShell::release`]
/// - `sleep` -> sleeps 10ms (tracks concurrency)
/// - anything else -> succeeds with the command echoed on stdout
#[derive(Clone)]
pub struct ScriptedShell {
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
    requests: Arc<Mutex<Vec<ShellRequest>>>,
}

impl Default for ScriptedShell {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
            gate: Arc::new(Semaphore::new(0)),
            requests: Arc::default(),
        }
    }
}

impl ScriptedShell {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ShellRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }
}

impl ShellExecutor for ScriptedShell {
    async fn exec(&self, request: ShellRequest) -> Result<ShellOutput, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match request.command.as_str() {
            "fail" => Err(BackendError::Launch("boom".to_string())),
            "panic" => panic!("scripted panic"),
            "gate" => {
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
                Ok(ShellOutput::default())
            }
            "sleep" => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(ShellOutput::default())
            }
            other => Ok(ShellOutput {
                stdout: format!("  {other}\n"),
                stderr: String::new(),
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Launcher that always succeeds and remembers what it was asked to start.
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    agents: Arc<Mutex<Vec<AgentLaunchRequest>>>,
    loops: Arc<Mutex<Vec<LoopLaunchRequest>>>,
}

impl RecordingLauncher {
    pub fn agents(&self) -> Vec<AgentLaunchRequest> {
        self.agents.lock().unwrap().clone()
    }

    pub fn loops(&self) -> Vec<LoopLaunchRequest> {
        self.loops.lock().unwrap().clone()
    }
}

impl HeadlessAgentLauncher for RecordingLauncher {
    async fn start(&self, request: AgentLaunchRequest) -> Result<LaunchHandle, BackendError> {
        self.agents.lock().unwrap().push(request);
        Ok(LaunchHandle {
            id: "session-1".to_string(),
        })
    }
}

impl LoopLauncher for RecordingLauncher {
    async fn start(&self, request: LoopLaunchRequest) -> Result<LaunchHandle, BackendError> {
        self.loops.lock().unwrap().push(request);
        Ok(LaunchHandle {
            id: "loop-1".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Records callbacks as short strings: `started`, `{node}:{status}`,
/// `completed`.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RunObserver for RecordingObserver {
    fn on_run_started(&self, _job: &CronJob, _run: &CronJobRun) {
        self.calls.lock().unwrap().push("started".to_string());
    }

    fn on_node_status(
        &self,
        _job_id: Uuid,
        _run_id: Uuid,
        node_id: &str,
        status: NodeStatus,
        _error: Option<&str>,
    ) {
        self.calls.lock().unwrap().push(format!("{node_id}:{status}"));
    }

    fn on_run_completed(&self, _job: &CronJob, _run: &CronJobRun) {
        self.calls.lock().unwrap().push("completed".to_string());
    }
}
