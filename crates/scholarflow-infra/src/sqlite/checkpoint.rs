//! SQLite checkpoint repository implementation.
//!
//! Implements `CheckpointRepository` from `scholarflow-core`. Each workflow
//! owns one row holding its latest state snapshot as a JSON blob; outcome and
//! query are denormalized so listings never decode snapshots.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use uuid::Uuid;

use scholarflow_core::repository::checkpoint::{CheckpointRecord, CheckpointRepository};
use scholarflow_types::error::RepositoryError;
use scholarflow_types::state::WorkflowOutcome;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CheckpointRepository`.
pub struct SqliteCheckpointRepository {
    pool: DatabasePool,
}

impl SqliteCheckpointRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct CheckpointRow {
    workflow_id: String,
    schema_version: i64,
    outcome: String,
    research_query: String,
    state: String,
    created_at: String,
    updated_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            workflow_id: row.try_get("workflow_id")?,
            schema_version: row.try_get("schema_version")?,
            outcome: row.try_get("outcome")?,
            research_query: row.try_get("research_query")?,
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<CheckpointRecord, RepositoryError> {
        let outcome: WorkflowOutcome =
            serde_json::from_value(serde_json::Value::String(self.outcome.clone()))
                .map_err(|_| RepositoryError::Query(format!("invalid outcome: {}", self.outcome)))?;

        let state = serde_json::from_str(&self.state)
            .map_err(|e| RepositoryError::Query(format!("invalid state JSON: {e}")))?;

        let schema_version = u32::try_from(self.schema_version).map_err(|_| {
            RepositoryError::Query(format!("invalid schema version: {}", self.schema_version))
        })?;

        Ok(CheckpointRecord {
            workflow_id: parse_uuid(&self.workflow_id)?,
            schema_version,
            outcome,
            research_query: self.research_query,
            state,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width timestamps so `ORDER BY updated_at` sorts chronologically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// CheckpointRepository impl
// ---------------------------------------------------------------------------

impl CheckpointRepository for SqliteCheckpointRepository {
    async fn put(&self, record: &CheckpointRecord) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(&record.state)
            .map_err(|e| RepositoryError::Query(format!("serialize state: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflow_checkpoints
                 (workflow_id, schema_version, outcome, research_query, state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(workflow_id) DO UPDATE SET
                 schema_version = excluded.schema_version,
                 outcome = excluded.outcome,
                 research_query = excluded.research_query,
                 state = excluded.state,
                 updated_at = excluded.updated_at"#,
        )
        .bind(record.workflow_id.to_string())
        .bind(i64::from(record.schema_version))
        .bind(record.outcome.as_str())
        .bind(&record.research_query)
        .bind(&state_json)
        .bind(format_datetime(&record.created_at))
        .bind(format_datetime(&record.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, workflow_id: &Uuid) -> Result<Option<CheckpointRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_checkpoints WHERE workflow_id = ?")
            .bind(workflow_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, limit: u32) -> Result<Vec<CheckpointRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_checkpoints ORDER BY updated_at DESC, workflow_id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = CheckpointRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            records.push(r.into_record()?);
        }
        Ok(records)
    }
}
