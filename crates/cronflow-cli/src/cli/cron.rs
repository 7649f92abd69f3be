//! CLI cron expression helpers: describe, next, validate.

use anyhow::{Result, bail};
use chrono::Local;
use clap::Subcommand;
use console::style;

use cronflow_core::cron::{self, CronSchedule, SEARCH_WINDOW_MINUTES};

/// Cron expression subcommands.
#[derive(Subcommand)]
pub enum CronCommand {
    /// Print a human-readable label for an expression.
    Describe {
        /// Five-field cron expression (quote it).
        expr: String,
    },

    /// List the next fire times in local time.
    Next {
        /// Five-field cron expression (quote it).
        expr: String,

        /// Number of fire times to list.
        #[arg(long, short = 'n', default_value = "5")]
        count: usize,
    },

    /// Check whether an expression would be scheduled. Exits 1 when not.
    Validate {
        /// Five-field cron expression (quote it).
        expr: String,
    },
}

/// Handle a cron subcommand. Returns `false` when the process should exit
/// with a failure status.
pub fn handle_cron_command(cmd: CronCommand, json: bool) -> Result<bool> {
    match cmd {
        CronCommand::Describe { expr } => {
            handle_describe(&expr, json)?;
            Ok(true)
        }
        CronCommand::Next { expr, count } => {
            handle_next(&expr, count, json)?;
            Ok(true)
        }
        CronCommand::Validate { expr } => handle_validate(&expr, json),
    }
}

/// Reject expressions the scheduler would never arm, with the reason.
pub fn validate_schedule(expr: &str) -> Result<()> {
    if let Err(e) = expr.parse::<CronSchedule>() {
        bail!("Invalid schedule '{expr}': {e}");
    }
    if !cron::is_valid(expr) {
        bail!(
            "Schedule '{expr}' has no fire time within the next {} hours",
            SEARCH_WINDOW_MINUTES / 60
        );
    }
    Ok(())
}

fn handle_describe(expr: &str, json: bool) -> Result<()> {
    let label = cron::describe(expr);
    if json {
        let out = serde_json::json!({ "expression": expr, "description": label });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{label}");
    }
    Ok(())
}

fn handle_next(expr: &str, count: usize, json: bool) -> Result<()> {
    validate_schedule(expr)?;
    let runs = cron::next_runs(expr, &Local::now(), count);

    if json {
        let out: Vec<_> = runs.iter().map(|t| t.to_rfc3339()).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(expr).cyan(),
        style(format!("({})", cron::describe(expr))).dim()
    );
    println!();
    for (i, at) in runs.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, at.format("%a %Y-%m-%d %H:%M"));
    }
    println!();
    Ok(())
}

fn handle_validate(expr: &str, json: bool) -> Result<bool> {
    let verdict = validate_schedule(expr);

    if json {
        let out = serde_json::json!({
            "expression": expr,
            "valid": verdict.is_ok(),
            "error": verdict.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(verdict.is_ok());
    }

    match verdict {
        Ok(()) => {
            println!(
                "  {} {} ({})",
                style("✓").green(),
                style(expr).cyan(),
                cron::describe(expr)
            );
            Ok(true)
        }
        Err(e) => {
            println!("  {} {e}", style("✗").red());
            Ok(false)
        }
    }
}
