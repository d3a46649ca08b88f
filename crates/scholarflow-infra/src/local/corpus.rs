//! Keyword search over a local JSON paper corpus.

use std::collections::HashSet;
use std::path::Path;

use scholarflow_core::collaborator::{CollaboratorError, SearchRequest, SearchService};
use scholarflow_types::research::Paper;

use super::terms;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("failed to read corpus {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid corpus {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Search service answering queries from an in-memory list of papers.
///
/// A paper matches when its title or abstract shares at least one term with
/// the query; relevance order is the number of shared terms.
#[derive(Debug, Clone, Default)]
pub struct LocalCorpusSearch {
    papers: Vec<Paper>,
}

impl LocalCorpusSearch {
    pub fn new(papers: Vec<Paper>) -> Self {
        Self { papers }
    }

    /// Load a JSON array of papers. A missing file yields an empty corpus.
    pub async fn load(path: &Path) -> Result<Self, CorpusError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "corpus file not found, searching an empty corpus");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(CorpusError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let papers: Vec<Paper> =
            serde_json::from_str(&content).map_err(|source| CorpusError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        tracing::debug!(path = %path.display(), papers = papers.len(), "corpus loaded");
        Ok(Self::new(papers))
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }
}

impl SearchService for LocalCorpusSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Paper>, CollaboratorError> {
        let query_terms = terms(&request.query);
        if query_terms.is_empty() {
            return Err(CollaboratorError::Rejected(format!(
                "query has no searchable terms: '{}'",
                request.query
            )));
        }

        let mut hits: Vec<(usize, &Paper)> = self
            .papers
            .iter()
            .filter_map(|paper| {
                let text: HashSet<String> =
                    terms(&format!("{} {}", paper.title, paper.summary)).into_iter().collect();
                let shared = query_terms.iter().filter(|t| text.contains(*t)).count();
                (shared > 0).then_some((shared, paper))
            })
            .collect();

        match request.sort_by.as_str() {
            "submitted_date" | "last_updated_date" => {
                hits.sort_by(|a, b| b.1.published.cmp(&a.1.published));
            }
            _ => hits.sort_by(|a, b| b.0.cmp(&a.0)),
        }
        if request.sort_order.eq_ignore_ascii_case("ascending") {
            hits.reverse();
        }

        Ok(hits
            .into_iter()
            .take(request.max_results as usize)
            .map(|(_, paper)| paper.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: &str, title: &str, published: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: title.to_string(),
            authors: vec!["A. Author".to_string()],
            summary: String::new(),
            pdf_url: Some(format!("{id}.txt")),
            published: Some(published.to_string()),
        }
    }

    fn corpus() -> LocalCorpusSearch {
        LocalCorpusSearch::new(vec![
            paper("p1", "Graph neural networks for chemistry", "2021-01-01"),
            paper("p2", "Attention in graph transformers", "2023-01-01"),
            paper("p3", "Protein folding with diffusion", "2022-01-01"),
        ])
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            max_results: 5,
            sort_by: "relevance".to_string(),
            sort_order: "descending".to_string(),
        }
    }

    #[tokio::test]
    async fn ranks_by_shared_terms() {
        let results = corpus().search(&request("graph neural networks")).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn respects_max_results_and_date_sort() {
        let mut req = request("graph protein");
        req.max_results = 2;
        req.sort_by = "submitted_date".to_string();

        let results = corpus().search(&req).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3"]);
    }

    #[tokio::test]
    async fn no_match_is_empty_not_error() {
        let results = corpus().search(&request("quantum cryptography")).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn query_without_terms_is_rejected() {
        let err = corpus().search(&request("a of")).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));
    }

    #[tokio::test]
    async fn load_reads_json_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        assert!(LocalCorpusSearch::load(&path).await.unwrap().is_empty());

        let papers = vec![paper("p1", "Graph", "2020-01-01")];
        tokio::fs::write(&path, serde_json::to_string(&papers).unwrap())
            .await
            .unwrap();
        assert_eq!(LocalCorpusSearch::load(&path).await.unwrap().len(), 1);

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            LocalCorpusSearch::load(&path).await,
            Err(CorpusError::Parse { .. })
        ));
    }
}
