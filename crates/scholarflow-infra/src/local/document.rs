//! Plain-text document processor for local files.

use std::path::{Path, PathBuf};

use serde_json::json;

use scholarflow_core::collaborator::{CollaboratorError, DocumentProcessor, ProcessedDocument};

/// Reads UTF-8 text documents from disk.
///
/// Accepts `file://` URLs, absolute paths, and paths relative to `base_dir`.
/// Remote URLs are rejected: there is no network access offline.
#[derive(Debug, Clone)]
pub struct LocalDocumentProcessor {
    base_dir: PathBuf,
}

impl LocalDocumentProcessor {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, url_or_path: &str) -> Result<PathBuf, CollaboratorError> {
        let trimmed = url_or_path.trim();
        if let Some(path) = trimmed.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if trimmed.contains("://") {
            return Err(CollaboratorError::Rejected(format!(
                "remote document not available offline: {trimmed}"
            )));
        }

        let path = Path::new(trimmed);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        })
    }
}

/// Normalize whitespace, drop blank lines, and collect section headings.
fn clean(raw: &str) -> (String, Vec<String>) {
    let mut lines = Vec::new();
    let mut sections = Vec::new();

    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            continue;
        }
        if let Some(heading) = line.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim().to_string();
            if !heading.is_empty() {
                sections.push(heading.clone());
                lines.push(heading);
            }
            continue;
        }
        lines.push(line);
    }

    (lines.join("\n"), sections)
}

impl DocumentProcessor for LocalDocumentProcessor {
    async fn process(&self, url_or_path: &str) -> Result<ProcessedDocument, CollaboratorError> {
        let path = self.resolve(url_or_path)?;

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                return Err(match err.kind() {
                    std::io::ErrorKind::NotFound => CollaboratorError::Rejected(format!(
                        "document not found: {}",
                        path.display()
                    )),
                    std::io::ErrorKind::InvalidData => CollaboratorError::Rejected(format!(
                        "document is not UTF-8 text: {}",
                        path.display()
                    )),
                    _ => CollaboratorError::Connection(format!("{}: {err}", path.display())),
                });
            }
        };

        let (cleaned_text, sections) = clean(&raw);
        let word_count = cleaned_text.split_whitespace().count();
        tracing::debug!(path = %path.display(), word_count, "document processed");

        Ok(ProcessedDocument {
            structure: json!({
                "source": path.display().to_string(),
                "line_count": cleaned_text.lines().count(),
                "word_count": word_count,
                "sections": sections,
            }),
            cleaned_text,
        })
    }
}
