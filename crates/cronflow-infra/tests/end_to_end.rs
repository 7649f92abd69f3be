//! Full path from a persisted job to a persisted run, using the real file
//! store and shell executor.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use cronflow_core::repository::JobRepository;
use cronflow_core::workflow::{
    DEFAULT_SHUTDOWN_TIMEOUT, NodeBackends, NoopObserver, Scheduler, TriggerOutcome,
    WaveExecutor,
};
use cronflow_infra::filesystem::FileJobStore;
use cronflow_infra::process::ProcessShellExecutor;
use cronflow_types::job::{CronJobPatch, NewCronJob};
use cronflow_types::run::{NodeStatus, RunStatus};
use cronflow_types::workflow::{
    NodeKind, ShellCommandNode, WorkflowEdge, WorkflowGraph, WorkflowNode,
};
use tempfile::TempDir;

fn shell(id: &str, command: &str) -> WorkflowNode {
    WorkflowNode::new(
        id,
        NodeKind::ShellCommand(ShellCommandNode {
            command: command.to_string(),
            ..Default::default()
        }),
    )
}

fn scheduler(store: Arc<FileJobStore>) -> Scheduler<FileJobStore> {
    let executor = WaveExecutor::new(
        store,
        NodeBackends::shell_only(ProcessShellExecutor::new()),
        Arc::new(NoopObserver),
    )
    .with_default_shell_timeout(Duration::from_secs(30));
    Scheduler::new(executor, DEFAULT_SHUTDOWN_TIMEOUT)
}

#[tokio::test]
async fn forced_trigger_of_single_shell_node_succeeds() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileJobStore::new(tmp.path()));
    let job = store
        .create(NewCronJob {
            name: "every minute".to_string(),
            schedule: "* * * * *".to_string(),
            enabled: true,
            workflow_graph: WorkflowGraph {
                nodes: vec![shell("only", "true")],
                edges: vec![],
            },
        })
        .await
        .unwrap();

    let scheduler = scheduler(Arc::clone(&store));
    let outcome = scheduler.trigger(job.id).await.unwrap();
    let TriggerOutcome::Completed(run) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.node_results.len(), 1);
    assert_eq!(run.node_results["only"].status, NodeStatus::Success);

    // Persisted history and the job's last-run summary survive a reopen.
    let reopened = FileJobStore::new(tmp.path());
    let history = reopened.list_runs(&job.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, run.id);
    let stored = reopened.load(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.last_run_status, Some(RunStatus::Success));
    assert_eq!(stored.last_run_at, run.completed_at);

    assert!(scheduler.shutdown().await);
}

#[tokio::test]
async fn failing_first_wave_skips_dependents_on_disk() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileJobStore::new(tmp.path()));
    let job = store
        .create(NewCronJob {
            name: "pipeline".to_string(),
            schedule: "0 3 * * *".to_string(),
            enabled: true,
            workflow_graph: WorkflowGraph {
                nodes: vec![
                    shell("fetch", "echo fetched"),
                    shell("check", "echo 'lint failed' >&2; exit 2"),
                    shell("deploy", "echo deployed"),
                ],
                edges: vec![
                    WorkflowEdge::new("fetch", "check"),
                    WorkflowEdge::new("check", "deploy"),
                ],
            },
        })
        .await
        .unwrap();

    let scheduler = scheduler(Arc::clone(&store));
    let TriggerOutcome::Completed(run) = scheduler.trigger(job.id).await.unwrap() else {
        panic!("expected a completed run");
    };

    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.node_results["fetch"].output.as_deref(), Some("fetched"));
    let check = &run.node_results["check"];
    assert_eq!(check.status, NodeStatus::Failed);
    assert!(check.error.as_deref().unwrap().ends_with("lint failed"));
    assert_eq!(run.node_results["deploy"].status, NodeStatus::Skipped);

    let history = store.list_runs(&job.id).await.unwrap();
    assert_eq!(history[0].node_results["deploy"].status, NodeStatus::Skipped);
}

#[tokio::test]
async fn daemon_runs_do_not_undo_changes_from_another_process() {
    let tmp = TempDir::new().unwrap();
    let daemon_store = Arc::new(FileJobStore::new(tmp.path()));
    let job = daemon_store
        .create(NewCronJob {
            name: "shared".to_string(),
            schedule: "*/5 * * * *".to_string(),
            enabled: true,
            workflow_graph: WorkflowGraph {
                nodes: vec![shell("only", "true")],
                edges: vec![],
            },
        })
        .await
        .unwrap();

    // The daemon warms its cache, then a CLI process disables the job.
    let daemon = scheduler(Arc::clone(&daemon_store));
    assert_eq!(daemon.start().await.unwrap(), 1);
    let cli_store = FileJobStore::new(tmp.path());
    cli_store
        .update(&job.id, CronJobPatch::enabled(false))
        .await
        .unwrap();

    let outcome = daemon.trigger(job.id).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Completed(_)));
    let on_disk = FileJobStore::new(tmp.path()).load(&job.id).await.unwrap().unwrap();
    assert!(!on_disk.enabled, "run bookkeeping kept the disable");
    assert_eq!(on_disk.last_run_status, Some(RunStatus::Success));

    // The CLI deletes the job; a daemon run must not bring it back.
    assert!(cli_store.delete(&job.id).await.unwrap());
    daemon.trigger(job.id).await.unwrap();
    assert!(!daemon_store.paths().job_file(&job.id).exists());
    assert!(!daemon_store.paths().runs_dir(&job.id).exists());

    assert!(daemon.shutdown().await);
}
