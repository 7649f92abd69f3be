//! JSON-file implementation of [`JobRepository`].
//!
//! One file per job definition and one run-history file per job, both
//! written atomically through [`write_json_atomic`]. Mutations are
//! serialized by a single async mutex so read-modify-write cycles (update,
//! append) never interleave within the process.
//!
//! `load_all` populates an in-memory cache on its first directory scan.
//! Later reads are served from it, and every mutation writes through to both
//! the file and the cache. Mutations always start from the file on disk, so a
//! stale cache entry never overwrites a change made by another process.
//! [`FileJobStore::refresh`] resyncs a single cache entry after such a change.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use cronflow_core::repository::JobRepository;
use cronflow_types::error::StoreError;
use cronflow_types::job::{CronJob, CronJobPatch, NewCronJob};
use cronflow_types::run::CronJobRun;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{CronPaths, write_json_atomic};

/// Runs kept per job unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// File-backed job store rooted at `{data_dir}/cron`.
pub struct FileJobStore {
    paths: CronPaths,
    history_limit: usize,
    /// `None` until the first `load_all`.
    cache: RwLock<Option<HashMap<Uuid, CronJob>>>,
    write_lock: Mutex<()>,
}

impl FileJobStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            paths: CronPaths::new(data_dir),
            history_limit: DEFAULT_HISTORY_LIMIT,
            cache: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Keep at most `limit` runs per job (minimum 1).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn paths(&self) -> &CronPaths {
        &self.paths
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Re-read one job from disk and resync its cache entry.
    ///
    /// Returns the job as it is now stored, or `None` (evicting the entry)
    /// when the file is gone or unreadable.
    pub async fn refresh(&self, id: &Uuid) -> Result<Option<CronJob>, StoreError> {
        let _guard = self.write_lock.lock().await;
        match self.read_job_file(id).await {
            Ok(Some(job)) => {
                self.cache_put(&job).await;
                Ok(Some(job))
            }
            Ok(None) => {
                self.cache_remove(id).await;
                Ok(None)
            }
            Err(StoreError::Serialization(e)) => {
                // Usually a half-written file from a non-atomic editor; the
                // next change event brings it back.
                tracing::warn!(job_id = %id, error = %e, "unreadable job file; unarming");
                self.cache_remove(id).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn cache_get(&self, id: &Uuid) -> Option<Option<CronJob>> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|jobs| jobs.get(id).cloned())
    }

    async fn cache_put(&self, job: &CronJob) {
        if let Some(jobs) = self.cache.write().await.as_mut() {
            jobs.insert(job.id, job.clone());
        }
    }

    async fn cache_remove(&self, id: &Uuid) {
        if let Some(jobs) = self.cache.write().await.as_mut() {
            jobs.remove(id);
        }
    }

    async fn read_job_file(&self, id: &Uuid) -> Result<Option<CronJob>, StoreError> {
        read_json(&self.paths.job_file(id)).await
    }

    async fn read_history(&self, job_id: &Uuid) -> Vec<CronJobRun> {
        let path = self.paths.history_file(job_id);
        match read_json::<Vec<CronJobRun>>(&path).await {
            Ok(Some(runs)) => runs,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    path = %path.display(),
                    error = %e,
                    "unreadable run history; treating as empty"
                );
                Vec::new()
            }
        }
    }

    async fn scan_jobs_dir(&self) -> Result<HashMap<Uuid, CronJob>, StoreError> {
        let dir = self.paths.jobs_dir();
        let mut jobs = HashMap::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(jobs),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json::<CronJob>(&path).await {
                Ok(Some(job)) => {
                    jobs.insert(job.id, job);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable job file");
                }
            }
        }

        Ok(jobs)
    }
}

impl std::fmt::Debug for FileJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJobStore")
            .field("root", &self.paths.root())
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

/// Read and parse a JSON file. `Ok(None)` when it does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file or directory tree. Returns whether it existed.
async fn remove_if_exists(path: &Path, is_dir: bool) -> Result<bool, StoreError> {
    let result = if is_dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl JobRepository for FileJobStore {
    async fn create(&self, job: NewCronJob) -> Result<CronJob, StoreError> {
        let _guard = self.write_lock.lock().await;
        let job = job.into_job(Utc::now());
        write_json_atomic(&self.paths.job_file(&job.id), &job).await?;
        self.cache_put(&job).await;
        tracing::info!(job_id = %job.id, name = %job.name, "job created");
        Ok(job)
    }

    async fn load(&self, id: &Uuid) -> Result<Option<CronJob>, StoreError> {
        if let Some(cached) = self.cache_get(id).await {
            return Ok(cached);
        }
        self.read_job_file(id).await
    }

    async fn load_all(&self) -> Result<Vec<CronJob>, StoreError> {
        let cached: Option<Vec<CronJob>> = self
            .cache
            .read()
            .await
            .as_ref()
            .map(|jobs| jobs.values().cloned().collect());

        let mut jobs = match cached {
            Some(jobs) => jobs,
            None => {
                // Block writers so no create lands between the scan and the fill.
                let _guard = self.write_lock.lock().await;
                let scanned = self.scan_jobs_dir().await?;
                let jobs = scanned.values().cloned().collect();
                let mut cache = self.cache.write().await;
                if cache.is_none() {
                    *cache = Some(scanned);
                }
                tracing::debug!(root = %self.paths.root().display(), "job cache populated");
                jobs
            }
        };

        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn update(&self, id: &Uuid, patch: CronJobPatch) -> Result<Option<CronJob>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut job) = self.read_job_file(id).await? else {
            // Deleted elsewhere; drop any stale copy instead of resurrecting it.
            self.cache_remove(id).await;
            return Ok(None);
        };
        patch.apply(&mut job, Utc::now());
        write_json_atomic(&self.paths.job_file(id), &job).await?;
        self.cache_put(&job).await;
        tracing::debug!(job_id = %id, "job updated");
        Ok(Some(job))
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let had_job = remove_if_exists(&self.paths.job_file(id), false).await?;
        let had_runs = remove_if_exists(&self.paths.runs_dir(id), true).await?;
        self.cache_remove(id).await;
        if had_job || had_runs {
            tracing::info!(job_id = %id, "job deleted");
        }
        Ok(had_job || had_runs)
    }

    async fn append_run(&self, job_id: &Uuid, run: CronJobRun) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if !tokio::fs::try_exists(self.paths.job_file(job_id)).await? {
            tracing::debug!(job_id = %job_id, "job no longer exists; run not recorded");
            return Ok(());
        }
        let mut runs = self.read_history(job_id).await;
        runs.push(run);
        if runs.len() > self.history_limit {
            let excess = runs.len() - self.history_limit;
            runs.drain(..excess);
        }
        write_json_atomic(&self.paths.history_file(job_id), &runs).await
    }

    async fn list_runs(&self, job_id: &Uuid) -> Result<Vec<CronJobRun>, StoreError> {
        Ok(self.read_history(job_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronflow_types::run::RunStatus;
    use cronflow_types::workflow::{NodeKind, ShellCommandNode, WorkflowGraph, WorkflowNode};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn new_job(name: &str) -> NewCronJob {
        NewCronJob {
            name: name.to_string(),
            schedule: "*/5 * * * *".to_string(),
            enabled: true,
            workflow_graph: WorkflowGraph {
                nodes: vec![WorkflowNode::new(
                    "build",
                    NodeKind::ShellCommand(ShellCommandNode {
                        command: "make".to_string(),
                        ..Default::default()
                    }),
                )],
                edges: vec![],
            },
        }
    }

    fn finished_run(job_id: Uuid) -> CronJobRun {
        let mut run = CronJobRun::start(job_id, Utc::now());
        run.status = RunStatus::Success;
        run.completed_at = Some(Utc::now());
        run
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());

        let job = store.create(new_job("nightly")).await.unwrap();
        assert!(store.paths().job_file(&job.id).exists());

        // A fresh store (cold cache) reads the same job back from disk.
        let reopened = FileJobStore::new(tmp.path());
        let loaded = reopened.load(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        assert!(store.load(&Uuid::now_v7()).await.unwrap().is_none());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_all_orders_by_creation() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let a = store.create(new_job("a")).await.unwrap();
        let b = store.create(new_job("b")).await.unwrap();

        let reopened = FileJobStore::new(tmp.path());
        let ids: Vec<Uuid> = reopened.load_all().await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_load_all_skips_corrupt_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let good = store.create(new_job("good")).await.unwrap();
        std::fs::write(store.paths().jobs_dir().join("broken.json"), "{ nope").unwrap();
        std::fs::write(store.paths().jobs_dir().join("notes.txt"), "ignored").unwrap();

        let reopened = FileJobStore::new(tmp.path());
        let jobs = reopened.load_all().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, good.id);
    }

    #[tokio::test]
    async fn test_cache_is_reused_until_mutation() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job = store.create(new_job("cached")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        // Out-of-band edits are not seen once the cache is warm.
        let mut edited = job.clone();
        edited.name = "edited on disk".to_string();
        std::fs::write(
            store.paths().job_file(&job.id),
            serde_json::to_vec(&edited).unwrap(),
        )
        .unwrap();
        assert_eq!(store.load(&job.id).await.unwrap().unwrap().name, "cached");

        // Mutations through the store write through to the cache.
        let patch = CronJobPatch {
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        store.update(&job.id, patch).await.unwrap();
        assert_eq!(store.load_all().await.unwrap()[0].name, "renamed");
    }

    #[tokio::test]
    async fn test_update_merges_and_persists() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job = store.create(new_job("u")).await.unwrap();

        let updated = store
            .update(&job.id, CronJobPatch::enabled(false))
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.name, "u");
        assert!(updated.updated_at >= job.updated_at);

        let reopened = FileJobStore::new(tmp.path());
        assert!(!reopened.load(&job.id).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_update_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let result = store
            .update(&Uuid::now_v7(), CronJobPatch::enabled(true))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_job_and_history() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job = store.create(new_job("d")).await.unwrap();
        store.append_run(&job.id, finished_run(job.id)).await.unwrap();
        store.load_all().await.unwrap();

        assert!(store.delete(&job.id).await.unwrap());
        assert!(!store.paths().job_file(&job.id).exists());
        assert!(!store.paths().runs_dir(&job.id).exists());
        assert!(store.load(&job.id).await.unwrap().is_none());
        assert!(store.load_all().await.unwrap().is_empty());

        assert!(!store.delete(&job.id).await.unwrap(), "second delete finds nothing");
    }

    #[tokio::test]
    async fn test_update_starts_from_disk_not_cache() {
        let tmp = TempDir::new().unwrap();
        let daemon = FileJobStore::new(tmp.path());
        let job = daemon.create(new_job("shared")).await.unwrap();
        daemon.load_all().await.unwrap();

        // Another process disables the job while the daemon's cache is warm.
        let cli = FileJobStore::new(tmp.path());
        cli.update(&job.id, CronJobPatch::enabled(false)).await.unwrap();

        // The daemon's last-run bookkeeping must keep that change.
        let after = daemon
            .update(&job.id, CronJobPatch::last_run(Utc::now(), RunStatus::Success))
            .await
            .unwrap()
            .unwrap();
        assert!(!after.enabled);
        assert_eq!(after.last_run_status, Some(RunStatus::Success));
        assert!(!cli.load(&job.id).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_update_after_external_delete_does_not_resurrect() {
        let tmp = TempDir::new().unwrap();
        let daemon = FileJobStore::new(tmp.path());
        let job = daemon.create(new_job("gone")).await.unwrap();
        daemon.load_all().await.unwrap();

        FileJobStore::new(tmp.path()).delete(&job.id).await.unwrap();

        let result = daemon
            .update(&job.id, CronJobPatch::last_run(Utc::now(), RunStatus::Success))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(!daemon.paths().job_file(&job.id).exists());
        assert!(daemon.load(&job.id).await.unwrap().is_none(), "stale entry evicted");
    }

    #[tokio::test]
    async fn test_refresh_resyncs_cache_entry() {
        let tmp = TempDir::new().unwrap();
        let daemon = FileJobStore::new(tmp.path());
        let job = daemon.create(new_job("before")).await.unwrap();
        daemon.load_all().await.unwrap();

        let cli = FileJobStore::new(tmp.path());
        let patch = CronJobPatch {
            name: Some("after".to_string()),
            ..Default::default()
        };
        cli.update(&job.id, patch).await.unwrap();

        let refreshed = daemon.refresh(&job.id).await.unwrap().unwrap();
        assert_eq!(refreshed.name, "after");
        assert_eq!(daemon.load_all().await.unwrap()[0].name, "after");

        cli.delete(&job.id).await.unwrap();
        assert!(daemon.refresh(&job.id).await.unwrap().is_none());
        assert!(daemon.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_evicts_unreadable_job() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job = store.create(new_job("torn")).await.unwrap();
        store.load_all().await.unwrap();

        std::fs::write(store.paths().job_file(&job.id), "{ half").unwrap();
        assert!(store.refresh(&job.id).await.unwrap().is_none());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_append_and_list_runs_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job_id = store.create(new_job("runs")).await.unwrap().id;
        let first = finished_run(job_id);
        let second = finished_run(job_id);
        store.append_run(&job_id, first.clone()).await.unwrap();
        store.append_run(&job_id, second.clone()).await.unwrap();

        assert_eq!(store.list_runs(&job_id).await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_history_keeps_most_recent_hundred() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job_id = store.create(new_job("busy")).await.unwrap().id;

        let mut ids = Vec::new();
        for _ in 0..101 {
            let run = finished_run(job_id);
            ids.push(run.id);
            store.append_run(&job_id, run).await.unwrap();
        }

        let runs = store.list_runs(&job_id).await.unwrap();
        assert_eq!(runs.len(), 100);
        assert_eq!(runs[0].id, ids[1], "oldest run pruned");
        assert_eq!(runs[99].id, ids[100]);
    }

    #[tokio::test]
    async fn test_custom_history_limit() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path()).with_history_limit(3);
        let job_id = store.create(new_job("short")).await.unwrap().id;
        for _ in 0..5 {
            store.append_run(&job_id, finished_run(job_id)).await.unwrap();
        }
        assert_eq!(store.list_runs(&job_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_history_reads_empty_and_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job_id = store.create(new_job("corrupt")).await.unwrap().id;
        let path = store.paths().history_file(&job_id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[{ truncated").unwrap();

        assert!(store.list_runs(&job_id).await.unwrap().is_empty());

        store.append_run(&job_id, finished_run(job_id)).await.unwrap();
        assert_eq!(store.list_runs(&job_id).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FileJobStore::new(tmp.path()));
        let job_id = store.create(new_job("parallel")).await.unwrap().id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.append_run(&job_id, finished_run(job_id)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list_runs(&job_id).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_append_after_delete_leaves_no_history() {
        let tmp = TempDir::new().unwrap();
        let store = FileJobStore::new(tmp.path());
        let job = store.create(new_job("in flight")).await.unwrap();
        store.delete(&job.id).await.unwrap();

        store.append_run(&job.id, finished_run(job.id)).await.unwrap();
        assert!(!store.paths().runs_dir(&job.id).exists());
        assert!(store.list_runs(&job.id).await.unwrap().is_empty());
    }
}
