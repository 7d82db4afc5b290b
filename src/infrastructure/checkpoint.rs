//! Sqlite-backed checkpoint store (the production `kv` backend).
//!
//! One row per checkpoint write; the latest row per workflow wins on
//! resume. State snapshots are stored as JSON.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::workflow::{Phase, WorkflowState};
use crate::domain::ports::checkpoint::{Checkpoint, CheckpointStore};

/// Key-value checkpoint store on sqlite.
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (creating if needed) the store at the given path.
    pub async fn open(path: &str) -> DomainResult<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workflow_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                state TEXT NOT NULL,
                written_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_workflow
             ON checkpoints (workflow_id, id)",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn put(
        &self,
        workflow_id: &str,
        phase: Phase,
        state: &WorkflowState,
    ) -> DomainResult<()> {
        let state_json = serde_json::to_string(state)?;
        let written_at = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO checkpoints (workflow_id, phase, state, written_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(workflow_id)
        .bind(phase.as_str())
        .bind(state_json)
        .bind(written_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_latest(&self, workflow_id: &str) -> DomainResult<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT phase, state, written_at FROM checkpoints
             WHERE workflow_id = ?1 ORDER BY id DESC LIMIT 1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let phase_str: String = row.get("phase");
        let phase: Phase = serde_json::from_value(serde_json::Value::String(phase_str.clone()))
            .map_err(|_| {
                DomainError::SerializationError(format!("unknown checkpoint phase {phase_str}"))
            })?;
        let state: WorkflowState = serde_json::from_str(&row.get::<String, _>("state"))?;
        let written_at = chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("written_at"))
            .map_err(|err| DomainError::SerializationError(err.to_string()))?
            .with_timezone(&chrono::Utc);

        Ok(Some(Checkpoint {
            workflow_id: workflow_id.to_string(),
            phase,
            state,
            written_at,
        }))
    }
}
