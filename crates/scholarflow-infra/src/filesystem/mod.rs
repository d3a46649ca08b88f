//! Data directory layout.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SCHOLARFLOW_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `SCHOLARFLOW_DATA_DIR` environment variable
/// 2. `~/.scholarflow`
/// 3. `.scholarflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".scholarflow");
    }

    PathBuf::from(".scholarflow")
}

/// Default location of the offline paper corpus: `{data_dir}/corpus.json`.
pub fn default_corpus_path(data_dir: &Path) -> PathBuf {
    data_dir.join("corpus.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_is_named_scholarflow_or_overridden() {
        let dir = resolve_data_dir();
        match std::env::var(DATA_DIR_ENV) {
            Ok(value) if !value.trim().is_empty() => assert_eq!(dir, PathBuf::from(value)),
            _ => assert!(dir.ends_with(".scholarflow")),
        }
    }

    #[test]
    fn test_default_corpus_path() {
        assert_eq!(
            default_corpus_path(Path::new("/data")),
            PathBuf::from("/data/corpus.json")
        );
    }
}
