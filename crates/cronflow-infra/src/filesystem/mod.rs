//! Filesystem adapters for cronflow.
//!
//! Data directory resolution, the on-disk layout under `{data_dir}/cron/`,
//! the atomic JSON write used by every persisted record, and change
//! notifications for job files written by other processes.

pub mod job_store;
pub mod watch;

use std::io::Write;
use std::path::{Path, PathBuf};

use cronflow_types::error::StoreError;
use serde::Serialize;
use tempfile::NamedTempFile;
use uuid::Uuid;

pub use job_store::FileJobStore;
pub use watch::{JobsWatcher, WatchError, watch_jobs_dir};

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CRONFLOW_DATA_DIR` environment variable
/// 2. `~/.cronflow`
/// 3. `./.cronflow` when no home directory is known
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CRONFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".cronflow");
    }

    PathBuf::from(".cronflow")
}

/// Paths of the persisted cron state:
///
/// ```text
/// {data_dir}/cron/jobs/{id}.json
/// {data_dir}/cron/runs/{id}/history.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPaths {
    root: PathBuf,
}

impl CronPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("cron"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn job_file(&self, id: &Uuid) -> PathBuf {
        self.jobs_dir().join(format!("{id}.json"))
    }

    pub fn runs_dir(&self, id: &Uuid) -> PathBuf {
        self.root.join("runs").join(id.to_string())
    }

    pub fn history_file(&self, id: &Uuid) -> PathBuf {
        self.runs_dir(id).join("history.json")
    }
}

/// Create `path` and any missing parents, owner-only on unix.
pub fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

/// Serialize `value` and replace `path` with it atomically: the bytes go to a
/// temp file in the same directory, are synced, then renamed over `path`.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;
    Ok(())
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    create_private_dir(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
