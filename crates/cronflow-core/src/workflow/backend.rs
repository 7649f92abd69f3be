//! Execution collaborators for workflow nodes.
//!
//! The executor reduces each node kind to one narrow capability: start an
//! agent session, start an iterative loop, or run a shell command. Each is a
//! trait here so infrastructure (processes, containers, remote APIs) and test
//! fakes plug in the same way.
//!
//! Same layering as the repository ports:
//! 1. An RPITIT trait (`ShellExecutor`, ...) that implementors write against
//! 2. An object-safe `*Dyn` twin with boxed futures, blanket-implemented
//! 3. `NodeBackends`, which bundles one `Arc<dyn *Dyn>` per node kind

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Start a headless agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLaunchRequest {
    pub reference_agent_id: String,
    pub prompt: String,
    pub model: Option<String>,
}

/// Start an iterative loop that runs until `completion_phrase` appears or
/// `max_iterations` is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopLaunchRequest {
    pub prompt: String,
    pub completion_phrase: String,
    pub max_iterations: u32,
    pub model: Option<String>,
    pub reference_agent_id: Option<String>,
}

/// Run `command` through the platform shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

/// Identifier of a launched unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchHandle {
    pub id: String,
}

/// Captured output of a shell command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Errors reported by an execution collaborator.
///
/// These never escape a run: the executor turns each one into a failed node
/// whose `error` is the display text below.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No collaborator is wired up for this node kind.
    #[error("no {0} launcher configured")]
    NotConfigured(&'static str),

    #[error("launch failed: {0}")]
    Launch(String),

    /// The process ran but exited unsuccessfully.
    #[error("command exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    #[error("timed out after {0}s")]
    TimedOut(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Starts long-running headless agent sessions.
pub trait HeadlessAgentLauncher: Send + Sync {
    fn start(
        &self,
        request: AgentLaunchRequest,
    ) -> impl Future<Output = Result<LaunchHandle, BackendError>> + Send;
}

/// Starts iterative agent loops.
pub trait LoopLauncher: Send + Sync {
    fn start(
        &self,
        request: LoopLaunchRequest,
    ) -> impl Future<Output = Result<LaunchHandle, BackendError>> + Send;
}

/// Runs shell commands.
pub trait ShellExecutor: Send + Sync {
    fn exec(
        &self,
        request: ShellRequest,
    ) -> impl Future<Output = Result<ShellOutput, BackendError>> + Send;
}

// ---------------------------------------------------------------------------
// Object-safe twins
// ---------------------------------------------------------------------------

/// Object-safe version of [`HeadlessAgentLauncher`].
pub trait HeadlessAgentLauncherDyn: Send + Sync {
    fn start_boxed(&self, request: AgentLaunchRequest)
    -> BoxFuture<'_, Result<LaunchHandle, BackendError>>;
}

impl<T: HeadlessAgentLauncher> HeadlessAgentLauncherDyn for T {
    fn start_boxed(
        &self,
        request: AgentLaunchRequest,
    ) -> BoxFuture<'_, Result<LaunchHandle, BackendError>> {
        Box::pin(HeadlessAgentLauncher::start(self, request))
    }
}

/// Object-safe version of [`LoopLauncher`].
pub trait LoopLauncherDyn: Send + Sync {
    fn start_boxed(&self, request: LoopLaunchRequest)
    -> BoxFuture<'_, Result<LaunchHandle, BackendError>>;
}

impl<T: LoopLauncher> LoopLauncherDyn for T {
    fn start_boxed(
        &self,
        request: LoopLaunchRequest,
    ) -> BoxFuture<'_, Result<LaunchHandle, BackendError>> {
        Box::pin(LoopLauncher::start(self, request))
    }
}

/// Object-safe version of [`ShellExecutor`].
pub trait ShellExecutorDyn: Send + Sync {
    fn exec_boxed(&self, request: ShellRequest) -> BoxFuture<'_, Result<ShellOutput, BackendError>>;
}

impl<T: ShellExecutor> ShellExecutorDyn for T {
    fn exec_boxed(&self, request: ShellRequest) -> BoxFuture<'_, Result<ShellOutput, BackendError>> {
        Box::pin(ShellExecutor::exec(self, request))
    }
}

// ---------------------------------------------------------------------------
// Unconfigured collaborators
// ---------------------------------------------------------------------------

/// Launcher used when no agent backend is configured. Every start fails with
/// [`BackendError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredLauncher;

impl HeadlessAgentLauncher for UnconfiguredLauncher {
    async fn start(&self, _request: AgentLaunchRequest) -> Result<LaunchHandle, BackendError> {
        Err(BackendError::NotConfigured("headless agent"))
    }
}

impl LoopLauncher for UnconfiguredLauncher {
    async fn start(&self, _request: LoopLaunchRequest) -> Result<LaunchHandle, BackendError> {
        Err(BackendError::NotConfigured("ralph loop"))
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// One collaborator per node kind, shared across concurrently running nodes.
#[derive(Clone)]
pub struct NodeBackends {
    pub headless_agent: Arc<dyn HeadlessAgentLauncherDyn>,
    pub ralph_loop: Arc<dyn LoopLauncherDyn>,
    pub shell: Arc<dyn ShellExecutorDyn>,
}

impl NodeBackends {
    /// Bundle with a shell executor and no agent launchers.
    pub fn shell_only(shell: impl ShellExecutor + 'static) -> Self {
        Self {
            headless_agent: Arc::new(UnconfiguredLauncher),
            ralph_loop: Arc::new(UnconfiguredLauncher),
            shell: Arc::new(shell),
        }
    }

    pub fn with_headless_agent(mut self, launcher: impl HeadlessAgentLauncher + 'static) -> Self {
        self.headless_agent = Arc::new(launcher);
        self
    }

    pub fn with_ralph_loop(mut self, launcher: impl LoopLauncher + 'static) -> Self {
        self.ralph_loop = Arc::new(launcher);
        self
    }
}

impl std::fmt::Debug for NodeBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBackends").finish_non_exhaustive()
    }
}
