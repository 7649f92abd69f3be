//! CLI command definitions and dispatch for the `cflow` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (e.g., `cflow job list`, `cflow cron next "0 9 * * 1-5"`).

pub mod cron;
pub mod job;
pub mod serve;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

/// Run workflows on cron schedules.
#[derive(Parser)]
#[command(name = "cflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage scheduled jobs and their run history.
    Job {
        #[command(subcommand)]
        action: job::JobCommand,
    },

    /// Inspect cron expressions.
    Cron {
        #[command(subcommand)]
        action: cron::CronCommand,
    },

    /// Arm every enabled job and run until Ctrl+C or SIGTERM.
    Serve,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Log filter used when `RUST_LOG` is unset.
    ///
    /// One-shot commands stay quiet by default; `serve` logs at `info` so the
    /// daemon reports what it arms and fires.
    pub fn default_log_filter(&self) -> &'static str {
        let serving = matches!(self.command, Commands::Serve);
        match self.verbose {
            0 if self.quiet => "error",
            0 if serving => "info",
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Parse a job id argument.
pub fn parse_job_id(raw: &str) -> Result<Uuid> {
    raw.trim()
        .parse::<Uuid>()
        .with_context(|| format!("'{raw}' is not a valid job id"))
}
