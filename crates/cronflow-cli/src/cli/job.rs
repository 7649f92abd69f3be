//! CLI job management subcommands.
//!
//! Provides create, list, show, update, enable, disable, delete, trigger and
//! runs operations over the file-backed job store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Local, Utc};
use clap::{ArgGroup, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use cronflow_core::cron;
use cronflow_core::repository::JobRepository;
use cronflow_core::workflow::dag::inspect_graph;
use cronflow_core::workflow::{TracingObserver, TriggerOutcome};
use cronflow_types::job::{CronJob, CronJobPatch, NewCronJob};
use cronflow_types::run::{CronJobRun, NodeStatus, RunStatus};
use cronflow_types::workflow::{NodeKind, ShellCommandNode, WorkflowGraph, WorkflowNode};

use super::cron::validate_schedule;
use super::parse_job_id;
use crate::state::AppState;

/// Node id used for graphs built from `--command`.
const COMMAND_NODE_ID: &str = "command";

/// Job management subcommands.
#[derive(Subcommand)]
pub enum JobCommand {
    /// Create a job from a workflow file or a single shell command.
    #[command(group(ArgGroup::new("graph").required(true).args(["file", "command"])))]
    Create {
        /// Job name.
        #[arg(long)]
        name: String,

        /// Five-field cron expression, e.g. "0 9 * * 1-5".
        #[arg(long)]
        schedule: String,

        /// Create the job disabled.
        #[arg(long)]
        disabled: bool,

        /// Workflow graph file (.json, .yaml or .yml).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Run this shell command as a one-node workflow.
        #[arg(long)]
        command: Option<String>,

        /// Working directory for --command.
        #[arg(long, requires = "command")]
        cwd: Option<String>,

        /// Timeout in seconds for --command.
        #[arg(long, requires = "command")]
        timeout: Option<u64>,
    },

    /// List all jobs.
    #[command(alias = "ls")]
    List,

    /// Show a job's schedule and workflow.
    Show {
        /// Job id.
        id: String,
    },

    /// Change a job's name, schedule or workflow.
    Update {
        /// Job id.
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        schedule: Option<String>,

        /// Replacement workflow graph file (.json, .yaml or .yml).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Enable a job.
    Enable {
        /// Job id.
        id: String,
    },

    /// Disable a job.
    Disable {
        /// Job id.
        id: String,
    },

    /// Delete a job and its run history.
    #[command(alias = "rm")]
    Delete {
        /// Job id.
        id: String,
    },

    /// Run a job now, regardless of its schedule.
    Trigger {
        /// Job id.
        id: String,
    },

    /// Show recent runs, newest first.
    Runs {
        /// Job id.
        id: String,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

/// Handle a job subcommand.
pub async fn handle_job_command(cmd: JobCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        JobCommand::Create {
            name,
            schedule,
            disabled,
            file,
            command,
            cwd,
            timeout,
        } => {
            let graph = match (file, command) {
                (Some(path), _) => load_graph_file(&path)?,
                (None, Some(command)) => command_graph(command, cwd, timeout),
                (None, None) => bail!("Either --file or --command is required"),
            };
            handle_create(state, name, schedule, !disabled, graph, json).await
        }
        JobCommand::List => handle_list(state, json).await,
        JobCommand::Show { id } => handle_show(state, &id, json).await,
        JobCommand::Update {
            id,
            name,
            schedule,
            file,
        } => {
            let graph = file.as_deref().map(load_graph_file).transpose()?;
            let patch = CronJobPatch {
                name,
                schedule,
                workflow_graph: graph,
                ..CronJobPatch::default()
            };
            handle_update(state, &id, patch, json).await
        }
        JobCommand::Enable { id } => {
            handle_update(state, &id, CronJobPatch::enabled(true), json).await
        }
        JobCommand::Disable { id } => {
            handle_update(state, &id, CronJobPatch::enabled(false), json).await
        }
        JobCommand::Delete { id } => handle_delete(state, &id, json).await,
        JobCommand::Trigger { id } => handle_trigger(state, &id, json).await,
        JobCommand::Runs { id, limit } => handle_runs(state, &id, limit, json).await,
    }
}

// ---------------------------------------------------------------------------
// Graph sources
// ---------------------------------------------------------------------------

/// Read a workflow graph from JSON, or YAML when the extension says so.
pub fn load_graph_file(path: &Path) -> Result<WorkflowGraph> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let graph = if is_yaml {
        serde_yaml_ng::from_str(&raw)
            .with_context(|| format!("Failed to parse workflow YAML {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse workflow JSON {}", path.display()))?
    };
    Ok(graph)
}

/// A one-node graph running `command`.
pub fn command_graph(command: String, cwd: Option<String>, timeout: Option<u64>) -> WorkflowGraph {
    WorkflowGraph {
        nodes: vec![WorkflowNode::new(
            COMMAND_NODE_ID,
            NodeKind::ShellCommand(ShellCommandNode {
                command,
                working_directory: cwd,
                timeout,
            }),
        )],
        edges: vec![],
    }
}

/// Print structural problems with a graph. They never block saving.
fn warn_graph_issues(graph: &WorkflowGraph, json: bool) {
    if json {
        return;
    }
    for issue in inspect_graph(graph) {
        eprintln!("  {} {issue}", style("warning:").yellow().bold());
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(
    state: &AppState,
    name: String,
    schedule: String,
    enabled: bool,
    graph: WorkflowGraph,
    json: bool,
) -> Result<()> {
    validate_schedule(&schedule)?;
    warn_graph_issues(&graph, json);

    let job = state
        .store
        .create(NewCronJob {
            name,
            schedule,
            enabled,
            workflow_graph: graph,
        })
        .await
        .context("Failed to save job")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        println!();
        println!(
            "  {} Created job '{}'",
            style("*").green().bold(),
            style(&job.name).cyan()
        );
        println!("  ID: {}", job.id);
        println!(
            "  Schedule: {} ({})",
            job.schedule,
            cron::describe(&job.schedule)
        );
        println!("  Nodes: {}", job.workflow_graph.nodes.len());
        if !job.enabled {
            println!("  Status: {}", style("disabled").yellow());
        }
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// List / Show
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let jobs = state.store.load_all().await.context("Failed to list jobs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!();
        println!("  No jobs yet.");
        println!(
            "  Create one with: {}",
            style("cflow job create --name <name> --schedule \"0 9 * * *\" --command <cmd>")
                .dim()
        );
        println!();
        return Ok(());
    }

    let now = Local::now();
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Schedule"),
            Cell::new("Enabled"),
            Cell::new("Next run"),
            Cell::new("Last run"),
        ]);

    for job in &jobs {
        let next = if job.enabled {
            cron::next_run(&job.schedule, &now)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(job.id),
            Cell::new(&job.name),
            Cell::new(cron::describe(&job.schedule)),
            enabled_cell(job.enabled),
            Cell::new(next),
            last_run_cell(job),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

async fn handle_show(state: &AppState, id: &str, json: bool) -> Result<()> {
    let job = require_job(state, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style(&job.name).cyan().bold(), style(job.id).dim());
    println!();
    println!(
        "  Schedule:   {} ({})",
        job.schedule,
        cron::describe(&job.schedule)
    );
    println!(
        "  Enabled:    {}",
        if job.enabled {
            style("yes").green()
        } else {
            style("no").yellow()
        }
    );
    if job.enabled {
        match cron::next_run(&job.schedule, &Local::now()) {
            Some(next) => println!("  Next run:   {}", next.format("%Y-%m-%d %H:%M")),
            None => println!("  Next run:   {}", style("none within 48 hours").yellow()),
        }
    }
    if let (Some(at), Some(status)) = (job.last_run_at, job.last_run_status) {
        println!("  Last run:   {} ({})", local_time(at), status_style(status));
    }
    println!("  Created:    {}", local_time(job.created_at));
    println!("  Updated:    {}", local_time(job.updated_at));
    println!();

    if job.workflow_graph.nodes.is_empty() {
        println!("  Workflow is empty.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Runs after"),
            Cell::new("Detail"),
        ]);

    for node in &job.workflow_graph.nodes {
        let upstream: Vec<&str> = job
            .workflow_graph
            .edges
            .iter()
            .filter(|e| e.target == node.id)
            .map(|e| e.source.as_str())
            .collect();
        table.add_row(vec![
            Cell::new(&node.id),
            Cell::new(node.type_name()),
            Cell::new(upstream.join(", ")),
            Cell::new(truncate(&node_detail(&node.kind), 60)),
        ]);
    }

    println!("{table}");
    println!();
    warn_graph_issues(&job.workflow_graph, json);

    Ok(())
}

// ---------------------------------------------------------------------------
// Update / Delete
// ---------------------------------------------------------------------------

async fn handle_update(
    state: &AppState,
    id: &str,
    patch: CronJobPatch,
    json: bool,
) -> Result<()> {
    let job_id = parse_job_id(id)?;
    if patch == CronJobPatch::default() {
        bail!("Nothing to update: pass --name, --schedule or --file");
    }
    if let Some(schedule) = &patch.schedule {
        validate_schedule(schedule)?;
    }
    if let Some(graph) = &patch.workflow_graph {
        warn_graph_issues(graph, json);
    }

    let job = state
        .store
        .update(&job_id, patch)
        .await
        .context("Failed to update job")?
        .ok_or_else(|| anyhow!("Job {job_id} not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        println!();
        println!(
            "  {} Updated job '{}' ({})",
            style("*").green().bold(),
            style(&job.name).cyan(),
            if job.enabled { "enabled" } else { "disabled" }
        );
        println!();
    }

    Ok(())
}

async fn handle_delete(state: &AppState, id: &str, json: bool) -> Result<()> {
    let job_id = parse_job_id(id)?;
    let existed = state
        .store
        .delete(&job_id)
        .await
        .context("Failed to delete job")?;
    if !existed {
        bail!("Job {job_id} not found");
    }

    if json {
        let out = serde_json::json!({ "id": job_id.to_string(), "deleted": true });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("  {} Deleted job {job_id}", style("*").green().bold());
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Trigger / Runs
// ---------------------------------------------------------------------------

async fn handle_trigger(state: &AppState, id: &str, json: bool) -> Result<()> {
    let job_id = parse_job_id(id)?;
    let scheduler = state.scheduler(Arc::new(TracingObserver));

    let outcome = scheduler.trigger(job_id).await;
    scheduler.shutdown().await;

    let run = match outcome.context("Failed to run job")? {
        TriggerOutcome::Completed(run) => *run,
        TriggerOutcome::NotFound => bail!("Job {job_id} not found"),
        TriggerOutcome::AlreadyRunning => bail!("Job {job_id} is already running"),
        TriggerOutcome::ShuttingDown => bail!("Scheduler is shutting down"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run);
    }

    Ok(())
}

async fn handle_runs(state: &AppState, id: &str, limit: usize, json: bool) -> Result<()> {
    let job = require_job(state, id).await?;
    let mut runs = state
        .store
        .list_runs(&job.id)
        .await
        .context("Failed to read run history")?;
    runs.reverse();
    runs.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!();
        println!("  No runs for job '{}'.", job.name);
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Started"),
            Cell::new("Duration"),
            Cell::new("Nodes (ok/failed/skipped)"),
        ]);

    for run in &runs {
        table.add_row(vec![
            Cell::new(run.id),
            status_cell(run.status),
            Cell::new(local_time(run.started_at)),
            Cell::new(duration_label(run)),
            Cell::new(format!(
                "{}/{}/{}",
                run.count(NodeStatus::Success),
                run.count(NodeStatus::Failed),
                run.count(NodeStatus::Skipped)
            )),
        ]);
    }

    println!();
    println!("  Recent runs for '{}'", style(&job.name).cyan());
    println!();
    println!("{table}");
    println!();

    Ok(())
}

/// Styled summary of one finished run.
pub fn print_run(run: &CronJobRun) {
    println!();
    println!(
        "  Run {} {} in {}",
        style(run.id).dim(),
        status_style(run.status),
        duration_label(run)
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Output / Error"),
        ]);

    for result in run.node_results.values() {
        let detail = result
            .error
            .as_deref()
            .or(result.output.as_deref())
            .unwrap_or("");
        let status = match result.status {
            NodeStatus::Success => Cell::new("success").fg(Color::Green),
            NodeStatus::Failed => Cell::new("failed").fg(Color::Red),
            NodeStatus::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
            other => Cell::new(other),
        };
        table.add_row(vec![
            Cell::new(&result.node_id),
            status,
            Cell::new(truncate(detail, 80)),
        ]);
    }

    println!("{table}");
    println!();
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn require_job(state: &AppState, id: &str) -> Result<CronJob> {
    let job_id = parse_job_id(id)?;
    state
        .store
        .load(&job_id)
        .await
        .context("Failed to load job")?
        .ok_or_else(|| anyhow!("Job {job_id} not found"))
}

fn node_detail(kind: &NodeKind) -> String {
    match kind {
        NodeKind::ShellCommand(shell) => shell.command.clone(),
        NodeKind::HeadlessAgent(agent) => format!("{}: {}", agent.reference_agent_id, agent.prompt),
        NodeKind::RalphLoop(ralph) => format!(
            "until '{}' (max {}): {}",
            ralph.completion_phrase, ralph.max_iterations, ralph.prompt
        ),
        NodeKind::Unknown { .. } => "unsupported node type".to_string(),
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn duration_label(run: &CronJobRun) -> String {
    match run.completed_at {
        Some(done) => {
            let ms = (done - run.started_at).num_milliseconds().max(0);
            if ms < 1000 {
                format!("{ms}ms")
            } else {
                format!("{:.1}s", ms as f64 / 1000.0)
            }
        }
        None => "-".to_string(),
    }
}

fn status_style(status: RunStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        RunStatus::Success => style(text).green(),
        RunStatus::Failed => style(text).red(),
        RunStatus::Partial => style(text).yellow(),
        RunStatus::Running => style(text).cyan(),
    }
}

fn status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Success => Color::Green,
        RunStatus::Failed => Color::Red,
        RunStatus::Partial => Color::Yellow,
        RunStatus::Running => Color::Cyan,
    }
}

fn status_cell(status: RunStatus) -> Cell {
    Cell::new(status).fg(status_color(status))
}

fn enabled_cell(enabled: bool) -> Cell {
    if enabled {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::Yellow)
    }
}

fn last_run_cell(job: &CronJob) -> Cell {
    match (job.last_run_at, job.last_run_status) {
        (Some(at), Some(status)) => {
            Cell::new(format!("{status} {}", local_time(at))).fg(status_color(status))
        }
        _ => Cell::new("-"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() <= max && !s.contains('\n') {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
