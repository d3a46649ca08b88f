//! Deterministic offline collaborators.
//!
//! These implement every collaborator port without network access or an
//! LLM: a keyword search over a local JSON corpus, a plain-text document
//! processor, an in-memory ingestion index, and heuristic agents that derive
//! summaries, gaps, and directions from the ingested text. They make the CLI
//! usable end to end and give the pipeline reproducible behavior.

pub mod agent;
pub mod corpus;
pub mod document;
pub mod index;

use std::collections::HashMap;
use std::path::PathBuf;

use scholarflow_core::collaborator::Collaborators;

pub use agent::{HeuristicQueryAgent, HeuristicReviewAgent};
pub use corpus::{CorpusError, LocalCorpusSearch};
pub use document::LocalDocumentProcessor;
pub use index::{IndexedDocument, MemoryIngestionIndex};

/// Wire the offline collaborators around one shared ingestion index.
///
/// Relative document paths in the corpus resolve against `documents_dir`.
pub fn offline_collaborators(corpus: LocalCorpusSearch, documents_dir: PathBuf) -> Collaborators {
    let index = MemoryIngestionIndex::new();
    Collaborators::new(
        HeuristicQueryAgent::new(index.clone()),
        HeuristicReviewAgent,
        corpus,
        LocalDocumentProcessor::new(documents_dir),
        index,
    )
}

const STOPWORDS: &[&str] = &[
    "about", "also", "and", "any", "are", "based", "between", "but", "can", "each", "for",
    "from", "has", "have", "into", "its", "more", "most", "new", "not", "our", "over", "such",
    "than", "that", "the", "their", "these", "this", "those", "towards", "use", "used", "using",
    "via", "was", "were", "which", "with",
];

/// Lowercased alphanumeric tokens of at least three characters, minus stopwords.
pub(crate) fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// The `n` most frequent terms of at least five characters, ties alphabetical.
pub(crate) fn top_terms<'a>(texts: impl IntoIterator<Item = &'a str>, n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for term in terms(text).into_iter().filter(|t| t.chars().count() >= 5) {
            *counts.entry(term).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(n).map(|(term, _)| term).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::checkpoint::SqliteCheckpointRepository;
    use crate::sqlite::pool::{DatabasePool, database_url};
    use scholarflow_core::workflow::engine::{Engine, StartRequest};
    use scholarflow_types::research::Paper;
    use scholarflow_types::state::WorkflowOutcome;

    #[test]
    fn terms_drop_short_words_and_stopwords() {
        assert_eq!(
            terms("Graph Neural Networks for the molecular-property task"),
            vec!["graph", "neural", "networks", "molecular", "property", "task"]
        );
    }

    #[test]
    fn top_terms_rank_by_frequency() {
        let texts = ["graph networks learn graph structure", "graph attention networks"];
        assert_eq!(top_terms(texts, 2), vec!["graph", "networks"]);
    }

    fn paper(id: &str, title: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: title.to_string(),
            authors: vec!["A. Author".to_string()],
            summary: String::new(),
            pdf_url: Some(format!("{id}.txt")),
            published: Some("2024-01-01".to_string()),
        }
    }

    #[tokio::test]
    async fn offline_pipeline_runs_end_to_end_on_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        for (id, text) in [
            ("p1", "# Abstract\nWe propose a molecular graph encoder. However, training remains costly."),
            ("p3", "# Abstract\nWe scale graph training to billions of edges. Future work: molecular graphs."),
        ] {
            tokio::fs::write(dir.path().join(format!("{id}.txt")), text)
                .await
                .unwrap();
        }

        let corpus = LocalCorpusSearch::new(vec![
            paper("p1", "Graph neural networks for molecules"),
            paper("p2", "Message passing networks on graphs"),
            paper("p3", "Scaling graph neural networks"),
        ]);
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        let engine = Engine::new(
            SqliteCheckpointRepository::new(pool),
            offline_collaborators(corpus, dir.path().to_path_buf()),
        )
        .unwrap();

        let id = engine
            .start(StartRequest::new("graph neural networks"))
            .await
            .unwrap();
        let state = engine.get_state(id).await.unwrap();

        assert_eq!(state.workflow_outcome, WorkflowOutcome::Success);
        let report = state.final_report.unwrap();
        let shortlisted: Vec<&str> = report
            .confirmed_shortlist
            .iter()
            .map(|p| p.paper.id.as_str())
            .collect();
        assert_eq!(shortlisted, vec!["p1", "p3"]);
        assert_eq!(report.ingestion.processed, 2);
        assert!(!report.final_directions.is_empty());
        assert_eq!(report.total_iterations, 2);
        assert_eq!(engine.list(5).await.unwrap()[0].workflow_id, id);
    }
}
