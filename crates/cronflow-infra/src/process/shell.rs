//! Shell executor for `shell-command` nodes.
//!
//! Runs the node's command through `sh -c` (`cmd /C` on Windows) in the
//! requested working directory, bounded by the request timeout.

use cronflow_core::workflow::backend::{BackendError, ShellExecutor, ShellOutput, ShellRequest};
use tokio::process::Command;

use super::run_to_completion;

/// Executes shell commands as child processes of the engine.
#[derive(Debug, Clone, Default)]
pub struct ProcessShellExecutor;

impl ProcessShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn command(request: &ShellRequest) -> Command {
        #[cfg(windows)]
        let mut command = {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&request.command);
            command
        };
        #[cfg(not(windows))]
        let mut command = {
            let mut command = Command::new("sh");
            command.arg("-c").arg(&request.command);
            command
        };

        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

impl ShellExecutor for ProcessShellExecutor {
    async fn exec(&self, request: ShellRequest) -> Result<ShellOutput, BackendError> {
        tracing::debug!(
            command = %request.command,
            cwd = ?request.cwd,
            timeout_secs = request.timeout.as_secs(),
            "running shell command"
        );

        let output = run_to_completion(Self::command(&request), None, request.timeout).await?;

        Ok(ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
