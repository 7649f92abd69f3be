//! Change notifications for the jobs directory.
//!
//! `cflow job` commands run in their own process and write job files
//! directly. The daemon watches `{data_dir}/cron/jobs` and receives the id of
//! every job whose file was created, replaced or removed, debounced so one
//! atomic rename yields one notification.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, DebouncedEvent, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::create_private_dir;

/// Quiet period before a burst of file events is reported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Errors from setting up the jobs-directory watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to create watcher: {0}")]
    WatcherCreation(String),

    #[error("failed to watch {path}: {reason}")]
    WatchPath { path: String, reason: String },
}

/// Keeps the watcher alive. Watching stops when this is dropped.
pub struct JobsWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    dir: PathBuf,
}

impl JobsWatcher {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for JobsWatcher {
    fn drop(&mut self) {
        tracing::debug!(dir = %self.dir.display(), "jobs watcher stopped");
    }
}

impl std::fmt::Debug for JobsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobsWatcher")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// Job id named by a `{id}.json` path. Temp files and anything else yield
/// `None`.
pub fn job_id_from_path(path: &Path) -> Option<Uuid> {
    if path.extension()?.to_str()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Distinct job ids touched by a batch of events, in id order.
fn changed_jobs(events: &[DebouncedEvent]) -> BTreeSet<Uuid> {
    events
        .iter()
        .filter_map(|event| job_id_from_path(&event.path))
        .collect()
}

/// Start watching `dir` (created if missing). Each changed job id is sent
/// once per debounced batch.
pub fn watch_jobs_dir(
    dir: &Path,
    debounce: Duration,
) -> Result<(JobsWatcher, mpsc::Receiver<Uuid>), WatchError> {
    create_private_dir(dir).map_err(|e| WatchError::WatchPath {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let (tx, rx) = mpsc::channel::<Uuid>(256);

    // The handler runs on the debouncer's own thread, so blocking sends are
    // fine and no change is dropped when the receiver falls behind.
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                let ids = changed_jobs(&events);
                if !ids.is_empty() {
                    tracing::debug!(count = ids.len(), "job files changed");
                }
                for id in ids {
                    if tx.blocking_send(id).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "jobs watcher error");
            }
        }
    })
    .map_err(|e| WatchError::WatcherCreation(e.to_string()))?;

    debouncer
        .watcher()
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| WatchError::WatchPath {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!(dir = %dir.display(), "watching jobs directory");

    Ok((
        JobsWatcher {
            _debouncer: debouncer,
            dir: dir.to_path_buf(),
        },
        rx,
    ))
}
