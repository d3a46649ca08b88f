//! Global configuration loader for Scholarflow.
//!
//! Reads `config.toml` from the data directory (`~/.scholarflow/` in
//! production) and deserializes it into [`GlobalConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use scholarflow_types::config::GlobalConfig;

use crate::filesystem::default_corpus_path;

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults (debug log).
/// - Unreadable or unparsable file: defaults (warn log).
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Corpus file for the offline search service.
///
/// A relative `corpus_path` is resolved against the data directory.
pub fn resolve_corpus_path(config: &GlobalConfig, data_dir: &Path) -> PathBuf {
    match &config.corpus_path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => data_dir.join(path),
        None => default_corpus_path(data_dir),
    }
}
