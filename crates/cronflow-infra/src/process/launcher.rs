//! Agent launcher backed by an external program.
//!
//! The configured program is started once per node with the prompt on stdin
//! and the remaining node settings in environment variables:
//!
//! | variable | set for |
//! |----------|---------|
//! | `CRONFLOW_LAUNCH_ID` | always (the id reported back to the run) |
//! | `CRONFLOW_MODEL` | when the node names a model |
//! | `CRONFLOW_AGENT_ID` | when the node references an agent |
//! | `CRONFLOW_COMPLETION_PHRASE` | ralph loops |
//! | `CRONFLOW_MAX_ITERATIONS` | ralph loops |
//!
//! A zero exit within the timeout counts as a successful launch.

use std::time::Duration;

use cronflow_core::workflow::backend::{
    AgentLaunchRequest, BackendError, HeadlessAgentLauncher, LaunchHandle, LoopLaunchRequest,
    LoopLauncher,
};
use cronflow_types::config::LauncherCommand;
use tokio::process::Command;
use uuid::Uuid;

use super::run_to_completion;

/// Launch timeout when the configuration does not set one (5 minutes).
pub const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 300;

/// Starts agent work by running a configured command.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    config: LauncherCommand,
}

impl CommandLauncher {
    pub fn new(config: LauncherCommand) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.unwrap_or(DEFAULT_LAUNCH_TIMEOUT_SECS))
    }

    async fn launch(
        &self,
        prompt: &str,
        env: Vec<(&'static str, String)>,
    ) -> Result<LaunchHandle, BackendError> {
        let id = Uuid::now_v7().to_string();

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .env("CRONFLOW_LAUNCH_ID", &id)
            .envs(env);

        tracing::debug!(program = %self.config.program, launch_id = %id, "launching agent process");
        run_to_completion(command, Some(prompt), self.timeout())
            .await
            .map_err(|e| match e {
                BackendError::Io(io) => {
                    BackendError::Launch(format!("{}: {io}", self.config.program))
                }
                other => other,
            })?;

        Ok(LaunchHandle { id })
    }
}

impl HeadlessAgentLauncher for CommandLauncher {
    async fn start(&self, request: AgentLaunchRequest) -> Result<LaunchHandle, BackendError> {
        let mut env = vec![("CRONFLOW_AGENT_ID", request.reference_agent_id)];
        if let Some(model) = request.model {
            env.push(("CRONFLOW_MODEL", model));
        }
        self.launch(&request.prompt, env).await
    }
}

impl LoopLauncher for CommandLauncher {
    async fn start(&self, request: LoopLaunchRequest) -> Result<LaunchHandle, BackendError> {
        let mut env = vec![
            ("CRONFLOW_COMPLETION_PHRASE", request.completion_phrase),
            ("CRONFLOW_MAX_ITERATIONS", request.max_iterations.to_string()),
        ];
        if let Some(model) = request.model {
            env.push(("CRONFLOW_MODEL", model));
        }
        if let Some(agent) = request.reference_agent_id {
            env.push(("CRONFLOW_AGENT_ID", agent));
        }
        self.launch(&request.prompt, env).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A launcher running `sh -c <script>`.
    fn sh(script: &str) -> CommandLauncher {
        CommandLauncher::new(LauncherCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs: Some(10),
        })
    }

    #[tokio::test]
    async fn test_headless_launch_passes_prompt_and_env() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("captured");
        let script = format!(
            "cat > {out}; echo \"$CRONFLOW_AGENT_ID|$CRONFLOW_MODEL|$CRONFLOW_LAUNCH_ID\" >> {out}",
            out = out.display()
        );

        let handle = HeadlessAgentLauncher::start(
            &sh(&script),
            AgentLaunchRequest {
                reference_agent_id: "reviewer".to_string(),
                prompt: "review this\n".to_string(),
                model: Some("fast".to_string()),
            },
        )
        .await
        .unwrap();

        let captured = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            captured,
            format!("review this\nreviewer|fast|{}\n", handle.id)
        );
        assert!(Uuid::parse_str(&handle.id).is_ok());
    }

    #[tokio::test]
    async fn test_loop_launch_passes_loop_settings() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("captured");
        let script = format!(
            "echo \"$CRONFLOW_COMPLETION_PHRASE|$CRONFLOW_MAX_ITERATIONS|${{CRONFLOW_MODEL:-none}}\" > {}",
            out.display()
        );

        LoopLauncher::start(
            &sh(&script),
            LoopLaunchRequest {
                prompt: "fix it".to_string(),
                completion_phrase: "DONE".to_string(),
                max_iterations: 7,
                model: None,
                reference_agent_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "DONE|7|none\n");
    }

    #[tokio::test]
    async fn test_failed_launch_reports_stderr() {
        let err = HeadlessAgentLauncher::start(
            &sh("echo 'no such agent' >&2; exit 1"),
            AgentLaunchRequest {
                reference_agent_id: "ghost".to_string(),
                prompt: String::new(),
                model: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().ends_with("no such agent"), "got: {err}");
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let launcher = CommandLauncher::new(LauncherCommand {
            program: "/nonexistent/cronflow-agent".to_string(),
            args: vec![],
            timeout_secs: None,
        });
        let err = HeadlessAgentLauncher::start(
            &launcher,
            AgentLaunchRequest {
                reference_agent_id: "a".to_string(),
                prompt: "p".to_string(),
                model: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackendError::Launch(_)));
        assert!(err.to_string().contains("/nonexistent/cronflow-agent"));
    }

    #[tokio::test]
    async fn test_timeout_covers_unread_large_prompt() {
        // Far larger than a pipe buffer, and the child never reads it.
        let launcher = CommandLauncher::new(LauncherCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exec sleep 30".to_string()],
            timeout_secs: Some(1),
        });
        let request = AgentLaunchRequest {
            reference_agent_id: "slow".to_string(),
            prompt: "x".repeat(1 << 20),
            model: None,
        };

        let result = tokio::time::timeout(
            Duration::from_secs(8),
            HeadlessAgentLauncher::start(&launcher, request),
        )
        .await
        .expect("launch gives up at its own timeout");
        assert!(matches!(result, Err(BackendError::TimedOut(1))), "got: {result:?}");
    }
}
