//! Global configuration types for Scholarflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! defaults applied to new workflows, logging output, and the location of the
//! local paper corpus.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::WorkflowConfig;

/// Top-level configuration for Scholarflow.
///
/// Loaded from `~/.scholarflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Defaults for every new workflow; CLI flags override per invocation.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// JSON file of papers searched by the offline search service.
    /// Defaults to `{data_dir}/corpus.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert!(!config.workflow.hitl_shortlist_review_active);
        assert_eq!(config.workflow.relevance_threshold, 0.7);
        assert!(!config.logging.json);
        assert!(config.corpus_path.is_none());
    }

    #[test]
    fn test_global_config_from_toml() {
        let toml_str = r#"
corpus_path = "/data/papers.json"

[workflow]
hitl_shortlist_review_active = true
relevance_threshold = 0.8

[logging]
json = true
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert!(config.workflow.hitl_shortlist_review_active);
        assert_eq!(config.workflow.relevance_threshold, 0.8);
        assert_eq!(config.workflow.max_results_per_query, 5);
        assert!(config.logging.json);
        assert!(!config.logging.otel);
        assert_eq!(config.corpus_path, Some(PathBuf::from("/data/papers.json")));
    }

    #[test]
    fn test_global_config_empty_toml() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.workflow, WorkflowConfig::default());
    }
}
