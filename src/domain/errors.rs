//! Domain error types.
//!
//! All error enums use thiserror. `DomainError` is the cross-cutting
//! result error for services and ports; collaborator clients classify
//! their own failures as transient or permanent before surfacing.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors for the swarm system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("No suitable agents available for task {0}")]
    NoSuitableAgents(Uuid),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is transient and could succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CollaboratorUnavailable(_) | Self::DatabaseError(_)
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let id = Uuid::new_v4();
        assert_eq!(
            DomainError::TaskNotFound(id).to_string(),
            format!("Task not found: {}", id)
        );
        assert_eq!(
            DomainError::InvalidStateTransition {
                from: "pending".into(),
                to: "completed".into()
            }
            .to_string(),
            "Invalid state transition from pending to completed"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(DomainError::CollaboratorUnavailable("llm 503".into()).is_transient());
        assert!(DomainError::DatabaseError("locked".into()).is_transient());
        assert!(!DomainError::ValidationFailed("bad".into()).is_transient());
        assert!(!DomainError::Cancelled("shutdown".into()).is_transient());
    }
}
