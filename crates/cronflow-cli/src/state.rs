//! Application state wiring the engine together.
//!
//! The core executor and scheduler are generic over the repository trait;
//! AppState pins them to the file-backed store and process backends.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cronflow_core::workflow::{RunObserver, Scheduler, WaveExecutor};
use cronflow_infra::config::load_engine_config;
use cronflow_infra::filesystem::{FileJobStore, resolve_data_dir};
use cronflow_infra::process::node_backends;
use cronflow_types::config::EngineConfig;

/// Scheduler pinned to the concrete store.
pub type ConcreteScheduler = Scheduler<FileJobStore>;

/// Shared state for every command.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FileJobStore>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, read `config.toml`, open the job store.
    pub async fn init() -> anyhow::Result<Self> {
        Self::init_at(resolve_data_dir()).await
    }

    pub async fn init_at(data_dir: PathBuf) -> anyhow::Result<Self> {
        let config = load_engine_config(&data_dir).await;
        let store = FileJobStore::new(&data_dir).with_history_limit(config.history_limit);

        tracing::debug!(
            data_dir = %data_dir.display(),
            history_limit = store.history_limit(),
            "application state ready"
        );

        Ok(Self {
            store: Arc::new(store),
            config,
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Build a scheduler over this state's store and configured backends.
    pub fn scheduler(&self, observer: Arc<dyn RunObserver>) -> ConcreteScheduler {
        let executor = WaveExecutor::new(
            Arc::clone(&self.store),
            node_backends(&self.config),
            observer,
        )
        .with_default_shell_timeout(Duration::from_secs(self.config.default_shell_timeout_secs));

        Scheduler::new(
            executor,
            Duration::from_secs(self.config.shutdown_timeout_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_at_applies_config() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "history_limit = 5\n").unwrap();

        let state = AppState::init_at(tmp.path().to_path_buf()).await.unwrap();
        assert_eq!(state.config.history_limit, 5);
        assert_eq!(state.store.history_limit(), 5);
        assert_eq!(state.data_dir(), tmp.path());
    }
}
