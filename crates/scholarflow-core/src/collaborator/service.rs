//! Service ports: paper search, document processing, and ingestion.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use scholarflow_types::research::{IngestionStatus, Paper};

use super::CollaboratorError;

/// Parameters for a single search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub sort_by: String,
    pub sort_order: String,
}

pub trait SearchService: Send + Sync {
    fn search(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<Vec<Paper>, CollaboratorError>> + Send;
}

/// Text extracted from a document plus whatever structure the processor recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub cleaned_text: String,
    #[serde(default)]
    pub structure: Value,
}

pub trait DocumentProcessor: Send + Sync {
    /// Fetch and clean the document at a URL or local path.
    fn process(
        &self,
        url_or_path: &str,
    ) -> impl Future<Output = Result<ProcessedDocument, CollaboratorError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReceipt {
    pub status: IngestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Stores processed documents for later analysis.
///
/// Implementations must be idempotent per `(session_id, doc_id)`: ingesting
/// the same document twice reports [`IngestionStatus::AlreadyIngested`]
/// instead of storing a duplicate.
pub trait IngestionService: Send + Sync {
    fn ingest(
        &self,
        session_id: &str,
        doc_id: &str,
        text: &str,
        metadata: &Value,
    ) -> impl Future<Output = Result<IngestionReceipt, CollaboratorError>> + Send;
}
