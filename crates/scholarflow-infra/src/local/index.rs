//! In-memory ingestion index keyed by `(session_id, doc_id)`.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use scholarflow_core::collaborator::{CollaboratorError, IngestionReceipt, IngestionService};
use scholarflow_core::workflow::nodes::collection_ref;
use scholarflow_types::research::IngestionStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub session_id: String,
    pub doc_id: String,
    pub text: String,
    pub metadata: Value,
}

/// Shared document store. Clones see the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryIngestionIndex {
    documents: Arc<DashMap<(String, String), IndexedDocument>>,
}

impl MemoryIngestionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents of one session, ordered by document id.
    pub fn session_documents(&self, session_id: &str) -> Vec<IndexedDocument> {
        let mut docs: Vec<IndexedDocument> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        docs
    }

    /// Documents behind a collection reference (`session_<id>_papers`).
    pub fn collection(&self, reference: &str) -> Vec<IndexedDocument> {
        let session = self
            .documents
            .iter()
            .map(|entry| entry.key().0.clone())
            .find(|session| collection_ref(session) == reference);

        session.map_or_else(Vec::new, |s| self.session_documents(&s))
    }
}

impl IngestionService for MemoryIngestionIndex {
    async fn ingest(
        &self,
        session_id: &str,
        doc_id: &str,
        text: &str,
        metadata: &Value,
    ) -> Result<IngestionReceipt, CollaboratorError> {
        if session_id.trim().is_empty() || doc_id.trim().is_empty() {
            return Err(CollaboratorError::Rejected(
                "session id and document id are required".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(CollaboratorError::Rejected(format!("document {doc_id} has no text")));
        }

        match self
            .documents
            .entry((session_id.to_string(), doc_id.to_string()))
        {
            Entry::Occupied(_) => Ok(IngestionReceipt {
                status: IngestionStatus::AlreadyIngested,
                detail: Some(format!("{doc_id} already stored for {session_id}")),
            }),
            Entry::Vacant(slot) => {
                slot.insert(IndexedDocument {
                    session_id: session_id.to_string(),
                    doc_id: doc_id.to_string(),
                    text: text.to_string(),
                    metadata: metadata.clone(),
                });
                tracing::debug!(session_id, doc_id, chars = text.len(), "document indexed");
                Ok(IngestionReceipt {
                    status: IngestionStatus::Success,
                    detail: None,
                })
            }
        }
    }
}
