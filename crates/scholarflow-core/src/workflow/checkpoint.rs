//! Durable checkpoints of workflow state.
//!
//! Wraps a `CheckpointRepository` to store the full `WorkflowState` after every
//! engine step, so a crashed host loses at most the node that was in flight.
//! Snapshots carry a schema version; unknown fields found when reading an
//! older or foreign snapshot are dropped with a warning.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use scholarflow_types::error::RepositoryError;
use scholarflow_types::state::{WorkflowOutcome, WorkflowState, STATE_SCHEMA_VERSION};

use crate::repository::checkpoint::{CheckpointRecord, CheckpointRepository};

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages versioned workflow snapshots.
///
/// Generic over `R: CheckpointRepository` so it works with any storage backend
/// (SQLite, in-memory, etc.).
pub struct CheckpointManager<R: CheckpointRepository> {
    repo: R,
}

/// Listing entry built from denormalized record columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSummary {
    pub workflow_id: Uuid,
    pub research_query: String,
    pub outcome: WorkflowOutcome,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<R: CheckpointRepository> CheckpointManager<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Persist the latest snapshot of `state`.
    pub async fn put(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        let snapshot = serde_json::to_value(state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        let record = CheckpointRecord {
            workflow_id: state.workflow_id,
            schema_version: STATE_SCHEMA_VERSION,
            outcome: state.workflow_outcome,
            research_query: state.research_query.clone(),
            state: snapshot,
            created_at: state.created_at,
            updated_at: state.updated_at,
        };

        self.repo
            .put(&record)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            workflow_id = %state.workflow_id,
            outcome = %state.workflow_outcome,
            node = ?state.current_node,
            messages = state.messages.len(),
            "checkpointed workflow state"
        );
        Ok(())
    }

    /// Load the latest snapshot of a workflow.
    pub async fn get(&self, workflow_id: Uuid) -> Result<WorkflowState, CheckpointError> {
        let record = self
            .repo
            .get(&workflow_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::NotFound(workflow_id))?;

        decode_state(record)
    }

    /// Most recently updated workflows, newest first.
    pub async fn list(&self, limit: u32) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let records = self
            .repo
            .list(limit)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        Ok(records
            .into_iter()
            .map(|r| CheckpointSummary {
                workflow_id: r.workflow_id,
                research_query: r.research_query,
                outcome: r.outcome,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect())
    }
}

/// Decode a stored snapshot, dropping top-level fields the current schema does not know.
fn decode_state(record: CheckpointRecord) -> Result<WorkflowState, CheckpointError> {
    if record.schema_version > STATE_SCHEMA_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            found: record.schema_version,
            supported: STATE_SCHEMA_VERSION,
        });
    }

    let state: WorkflowState = serde_json::from_value(record.state.clone())
        .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

    if let (Value::Object(stored), Ok(Value::Object(known))) =
        (&record.state, serde_json::to_value(&state))
    {
        for field in stored.keys().filter(|k| !known.contains_key(*k)) {
            tracing::warn!(
                workflow_id = %record.workflow_id,
                field = %field,
                schema_version = record.schema_version,
                "dropping unknown checkpoint field"
            );
        }
    }

    Ok(state)
}

// ---------------------------------------------------------------------------
// In-memory repository
// ---------------------------------------------------------------------------

/// Process-local checkpoint store.
///
/// Sharded map keyed by workflow id; writes to distinct workflows never
/// contend on a shared lock.
#[derive(Default)]
pub struct MemoryCheckpointRepository {
    records: DashMap<Uuid, CheckpointRecord>,
}

impl MemoryCheckpointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CheckpointRepository for MemoryCheckpointRepository {
    async fn put(&self, record: &CheckpointRecord) -> Result<(), RepositoryError> {
        self.records.insert(record.workflow_id, record.clone());
        Ok(())
    }

    async fn get(&self, workflow_id: &Uuid) -> Result<Option<CheckpointRecord>, RepositoryError> {
        Ok(self.records.get(workflow_id).map(|r| r.value().clone()))
    }

    async fn list(&self, limit: u32) -> Result<Vec<CheckpointRecord>, RepositoryError> {
        let mut records: Vec<CheckpointRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(limit as usize);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    #[error("workflow not found: {0}")]
    NotFound(Uuid),

    #[error("checkpoint serialization error: {0}")]
    Serialization(String),

    #[error("checkpoint schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
