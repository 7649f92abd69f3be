//! Engine configuration loader for cronflow.
//!
//! Reads `config.toml` from the data directory (`~/.cronflow/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::Path;

use cronflow_types::config::EngineConfig;

/// Smallest run history a job may keep.
const MIN_HISTORY_LIMIT: usize = 1;

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config with
///   out-of-range values clamped.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

fn sanitize(mut config: EngineConfig) -> EngineConfig {
    if config.history_limit < MIN_HISTORY_LIMIT {
        tracing::warn!(
            history_limit = config.history_limit,
            "history_limit must be at least {MIN_HISTORY_LIMIT}; clamping"
        );
        config.history_limit = MIN_HISTORY_LIMIT;
    }
    config
}
