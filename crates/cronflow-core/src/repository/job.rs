//! Job repository trait definition.
//!
//! Defines the storage interface for cron job definitions and their run
//! histories. The infrastructure layer (cronflow-infra) implements this trait
//! with JSON files written atomically.

use cronflow_types::error::StoreError;
use cronflow_types::job::{CronJob, CronJobPatch, NewCronJob};
use cronflow_types::run::CronJobRun;
use uuid::Uuid;

/// Repository trait for cron job persistence.
///
/// Covers two entity families:
/// - **Jobs:** create/load/update/delete of job definitions.
/// - **Runs:** append-only, bounded per-job run history.
///
/// Implementations must be safe to call concurrently from one process.
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait JobRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Persist a new job with a fresh id and timestamps.
    fn create(
        &self,
        job: NewCronJob,
    ) -> impl std::future::Future<Output = Result<CronJob, StoreError>> + Send;

    /// Load one job. `Ok(None)` when it does not exist.
    fn load(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<CronJob>, StoreError>> + Send;

    /// Load every job, ordered by creation time.
    fn load_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<CronJob>, StoreError>> + Send;

    /// Merge `patch` into the current stored job and bump `updated_at`.
    /// `Ok(None)` when the job does not exist.
    fn update(
        &self,
        id: &Uuid,
        patch: CronJobPatch,
    ) -> impl std::future::Future<Output = Result<Option<CronJob>, StoreError>> + Send;

    /// Remove the job and its run history. Returns `true` if anything existed.
    fn delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Append a finished run, keeping only the most recent runs up to the
    /// store's history limit. Does nothing once the job has been deleted.
    fn append_run(
        &self,
        job_id: &Uuid,
        run: CronJobRun,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Run history, oldest first. A missing or corrupt history reads as empty.
    fn list_runs(
        &self,
        job_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<CronJobRun>, StoreError>> + Send;
}
