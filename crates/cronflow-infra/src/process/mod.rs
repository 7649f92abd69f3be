//! Process-backed node backends.
//!
//! - `shell` -- runs `shell-command` nodes through the platform shell
//! - `launcher` -- starts agent sessions and loops via a configured program

pub mod launcher;
pub mod shell;

use std::process::{Output, Stdio};
use std::time::Duration;

use cronflow_core::workflow::backend::{BackendError, NodeBackends};
use cronflow_types::config::EngineConfig;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub use launcher::CommandLauncher;
pub use shell::ProcessShellExecutor;

/// Build the backend bundle described by `config`: a process shell executor
/// plus a [`CommandLauncher`] for each configured launcher table.
pub fn node_backends(config: &EngineConfig) -> NodeBackends {
    let mut backends = NodeBackends::shell_only(ProcessShellExecutor::new());
    if let Some(command) = &config.headless_agent {
        backends = backends.with_headless_agent(CommandLauncher::new(command.clone()));
    }
    if let Some(command) = &config.ralph_loop {
        backends = backends.with_ralph_loop(CommandLauncher::new(command.clone()));
    }
    backends
}

/// Spawn `command`, optionally feed `stdin`, and wait for it within `timeout`.
///
/// The timeout covers writing `stdin` too. The child is killed if it elapses. A non-zero exit becomes
/// [`BackendError::Exited`] carrying the trimmed stderr.
pub(crate) async fn run_to_completion(
    mut command: Command,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<Output, BackendError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let pipe = child.stdin.take();

    // Feed stdin while draining output, all under the timeout: a child that
    // never reads a large prompt must not stall the write forever.
    let feed = async move {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            // A child that never reads stdin closes the pipe early; not an error.
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                tracing::debug!(error = %e, "child closed stdin before reading all input");
            }
            // Dropping the pipe signals EOF.
        }
    };
    let run = async move {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| BackendError::TimedOut(timeout.as_secs()))??;

    if !output.status.success() {
        return Err(BackendError::Exited {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}
