//! `cflow serve`: the scheduler daemon.
//!
//! Arms every enabled job, reports run events until Ctrl+C or SIGTERM, then
//! drains in-flight runs. Job files written by other `cflow` processes are
//! watched: each change resyncs the store's cache entry and re-arms or
//! unarms that job.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use cronflow_core::event::EventBus;
use cronflow_core::repository::JobRepository;
use cronflow_core::workflow::{ObserverSet, TracingObserver};
use cronflow_infra::filesystem::watch::{DEFAULT_DEBOUNCE, watch_jobs_dir};
use cronflow_types::event::CronEvent;
use cronflow_types::run::RunStatus;

use crate::state::{AppState, ConcreteScheduler};

/// Run the scheduler until a shutdown signal arrives.
pub async fn serve(state: &AppState, json: bool, quiet: bool) -> Result<()> {
    let bus = EventBus::default();
    let observers = ObserverSet::new()
        .with(TracingObserver)
        .with(bus.clone());
    let scheduler = state.scheduler(Arc::new(observers));

    let reporter = (!quiet).then(|| spawn_event_reporter(bus.subscribe(), json));

    // Watch before the initial load so no change slips in between.
    let (watcher, changes) = watch_jobs_dir(&state.store.paths().jobs_dir(), DEFAULT_DEBOUNCE)
        .context("Failed to watch the jobs directory")?;
    let follower = spawn_change_follower(scheduler.clone(), changes);

    let armed = scheduler
        .start()
        .await
        .context("Failed to load jobs")?;

    if !json && !quiet {
        print_banner(state, &scheduler, armed).await;
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    drop(watcher);
    follower.abort();
    let drained = scheduler.shutdown().await;
    if let Some(reporter) = reporter {
        reporter.abort();
    }

    if !json && !quiet {
        if drained {
            println!("\n  Scheduler stopped.");
        } else {
            println!(
                "\n  {} Scheduler stopped with runs still in flight.",
                style("!").yellow().bold()
            );
        }
    }

    Ok(())
}

async fn print_banner(state: &AppState, scheduler: &ConcreteScheduler, armed: usize) {
    println!();
    println!(
        "  {} cronflow scheduler running, {} job{} armed",
        style("⚡").bold(),
        style(armed).cyan(),
        if armed == 1 { "" } else { "s" }
    );
    println!(
        "  {}",
        style(format!("Data: {}", state.data_dir().display())).dim()
    );

    let next_fires = scheduler.armed_jobs();
    if !next_fires.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Job").fg(Color::Cyan),
                Cell::new("Next run"),
            ]);

        for (job_id, next) in next_fires {
            let name = scheduler
                .repository()
                .load(&job_id)
                .await
                .ok()
                .flatten()
                .map(|job| job.name)
                .unwrap_or_else(|| job_id.to_string());
            table.add_row(vec![
                Cell::new(name),
                Cell::new(next.with_timezone(&Local).format("%Y-%m-%d %H:%M")),
            ]);
        }

        println!();
        println!("{table}");
    }

    println!();
    println!("  {}", style("Press Ctrl+C to stop").dim());
    println!();
}

/// Apply job file changes from other processes until the watcher stops.
fn spawn_change_follower(
    scheduler: ConcreteScheduler,
    mut changes: mpsc::Receiver<Uuid>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job_id) = changes.recv().await {
            sync_job(&scheduler, job_id).await;
        }
    })
}

/// Reload one job from disk and make its timer match.
async fn sync_job(scheduler: &ConcreteScheduler, job_id: Uuid) {
    match scheduler.repository().refresh(&job_id).await {
        Ok(Some(job)) => {
            let armed = scheduler.reschedule(&job);
            tracing::debug!(job_id = %job_id, enabled = job.enabled, armed, "job reloaded from disk");
        }
        Ok(None) => {
            if scheduler.unarm(&job_id) {
                tracing::info!(job_id = %job_id, "job removed on disk; unarmed");
            }
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "failed to reload changed job");
        }
    }
}

/// Print run events as they arrive: one JSON object per line under `--json`,
/// otherwise a line per finished run.
fn spawn_event_reporter(mut rx: broadcast::Receiver<CronEvent>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if json {
                        match serde_json::to_string(&event) {
                            Ok(line) => println!("{line}"),
                            Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
                        }
                    } else if let Some(line) = describe_event(&event) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event reporter lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn describe_event(event: &CronEvent) -> Option<String> {
    let CronEvent::RunCompleted {
        job_id,
        run_id,
        status,
        duration_ms,
    } = event
    else {
        return None;
    };

    let status = match status {
        RunStatus::Success => style(status.to_string()).green(),
        RunStatus::Failed => style(status.to_string()).red(),
        RunStatus::Partial => style(status.to_string()).yellow(),
        RunStatus::Running => style(status.to_string()).cyan(),
    };
    Some(format!(
        "  {} job {job_id} run {} {status} in {duration_ms}ms",
        Local::now().format("%H:%M:%S"),
        style(run_id).dim()
    ))
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
