//! Checkpoint repository trait definition.
//!
//! Stores one record per workflow holding the latest full state snapshot.
//! The infrastructure layer (scholarflow-infra) implements this trait with
//! SQLite persistence; an in-memory implementation lives alongside the
//! checkpoint manager.

use chrono::{DateTime, Utc};
use scholarflow_types::error::RepositoryError;
use scholarflow_types::state::WorkflowOutcome;
use serde_json::Value;
use uuid::Uuid;

/// A persisted workflow snapshot.
///
/// `state` is the serialized `WorkflowState`; `outcome` and `research_query`
/// are denormalized copies so listings do not need to decode the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub workflow_id: Uuid,
    pub schema_version: u32,
    pub outcome: WorkflowOutcome,
    pub research_query: String,
    pub state: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository trait for workflow checkpoints, keyed by workflow id.
///
/// Implementations must allow concurrent reads and writes for distinct keys
/// without blocking each other.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointRepository: Send + Sync {
    /// Insert or replace the snapshot for `record.workflow_id`.
    fn put(
        &self,
        record: &CheckpointRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get the latest snapshot for a workflow.
    fn get(
        &self,
        workflow_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<CheckpointRecord>, RepositoryError>> + Send;

    /// List the most recently updated snapshots, newest first.
    fn list(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<CheckpointRecord>, RepositoryError>> + Send;
}
