//! Checkpoint store port.
//!
//! The engine writes `(workflow_id, phase, state snapshot)` after every
//! phase; `resume` loads the latest snapshot to re-enter at the recorded
//! phase. The in-memory store is the default; the kv store is used in
//! production.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::workflow::{Phase, WorkflowState};

/// A stored checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: String,
    pub phase: Phase,
    pub state: WorkflowState,
    pub written_at: DateTime<Utc>,
}

/// Port to the checkpoint store.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot taken after a phase completed.
    async fn put(&self, workflow_id: &str, phase: Phase, state: &WorkflowState)
        -> DomainResult<()>;

    /// Load the most recent checkpoint for a workflow, if any.
    async fn get_latest(&self, workflow_id: &str) -> DomainResult<Option<Checkpoint>>;
}

/// In-memory checkpoint store (default backend).
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints written for a workflow.
    pub async fn count(&self, workflow_id: &str) -> usize {
        self.checkpoints
            .read()
            .await
            .get(workflow_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(
        &self,
        workflow_id: &str,
        phase: Phase,
        state: &WorkflowState,
    ) -> DomainResult<()> {
        let checkpoint = Checkpoint {
            workflow_id: workflow_id.to_string(),
            phase,
            state: state.clone(),
            written_at: Utc::now(),
        };
        self.checkpoints
            .write()
            .await
            .entry(workflow_id.to_string())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn get_latest(&self, workflow_id: &str) -> DomainResult<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(workflow_id)
            .and_then(|v| v.last().cloned()))
    }
}
