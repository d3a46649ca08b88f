//! Collaborator ports consumed by pipeline nodes.
//!
//! LLM agents, the paper search service, document processing, and ingestion
//! are external to the engine. Each is reached through a small async trait
//! (native async fn in traits, Rust 2024 edition, no async_trait macro) and
//! stored type-erased in [`Collaborators`], which is handed once to the
//! engine at construction.

pub mod agent;
pub mod box_collaborator;
pub mod service;

use scholarflow_types::state::FailureKind;

pub use agent::{QueryAgent, QueryFormulation, ReviewAgent};
pub use box_collaborator::{
    BoxDocumentProcessor, BoxIngestionService, BoxQueryAgent, BoxReviewAgent, BoxSearchService,
};
pub use service::{
    DocumentProcessor, IngestionReceipt, IngestionService, ProcessedDocument, SearchRequest,
    SearchService,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned by collaborator calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CollaboratorError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimited(_) | Self::Connection(_) | Self::InvalidResponse(_)
        )
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Cancelled => FailureKind::Cancelled,
            Self::Rejected(_) => FailureKind::Validation,
            _ => FailureKind::Transient,
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The full set of external collaborators injected into the engine.
pub struct Collaborators {
    pub query_agent: BoxQueryAgent,
    pub review_agent: BoxReviewAgent,
    pub search: BoxSearchService,
    pub documents: BoxDocumentProcessor,
    pub ingestion: BoxIngestionService,
}

impl Collaborators {
    pub fn new(
        query_agent: impl QueryAgent + 'static,
        review_agent: impl ReviewAgent + 'static,
        search: impl SearchService + 'static,
        documents: impl DocumentProcessor + 'static,
        ingestion: impl IngestionService + 'static,
    ) -> Self {
        Self {
            query_agent: BoxQueryAgent::new(query_agent),
            review_agent: BoxReviewAgent::new(review_agent),
            search: BoxSearchService::new(search),
            documents: BoxDocumentProcessor::new(documents),
            ingestion: BoxIngestionService::new(ingestion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(
            CollaboratorError::Timeout {
                operation: "search",
                secs: 5
            }
            .is_transient()
        );
        assert!(CollaboratorError::RateLimited("429".into()).is_transient());
        assert!(CollaboratorError::Connection("reset".into()).is_transient());
        assert!(!CollaboratorError::Rejected("bad request".into()).is_transient());
        assert!(!CollaboratorError::Cancelled.is_transient());
    }

    #[test]
    fn failure_kind_mapping() {
        assert_eq!(
            CollaboratorError::Connection("x".into()).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            CollaboratorError::Rejected("x".into()).failure_kind(),
            FailureKind::Validation
        );
        assert_eq!(CollaboratorError::Cancelled.failure_kind(), FailureKind::Cancelled);
    }

    #[test]
    fn timeout_display_names_operation() {
        let err = CollaboratorError::Timeout {
            operation: "analyze_literature",
            secs: 30,
        };
        assert_eq!(err.to_string(), "analyze_literature timed out after 30s");
    }
}
