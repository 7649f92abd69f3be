//! Engine configuration types for cronflow.
//!
//! `EngineConfig` represents `config.toml` in the data directory. Every field
//! has a default so an empty or missing file yields a working engine.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum runs kept in a job's history (oldest pruned first).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// How long `shutdown` waits for in-flight runs before giving up.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Timeout applied to shell nodes that do not set their own.
    #[serde(default = "default_shell_timeout_secs")]
    pub default_shell_timeout_secs: u64,

    /// External command used to start headless agent sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless_agent: Option<LauncherCommand>,

    /// External command used to start ralph loops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ralph_loop: Option<LauncherCommand>,
}

fn default_history_limit() -> usize {
    100
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_shell_timeout_secs() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            default_shell_timeout_secs: default_shell_timeout_secs(),
            headless_agent: None,
            ralph_loop: None,
        }
    }
}

/// A program plus fixed arguments used to launch an agent process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound on how long the launched process may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}
