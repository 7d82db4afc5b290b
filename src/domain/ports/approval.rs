//! Human approval port.
//!
//! The approval transport is intentionally abstract: the engine consults
//! the gate when a workflow reaches the human-approval phase, and any
//! channel (callback endpoint, queue, terminal prompt) can implement it.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::workflow::{ApprovalStatus, WorkflowState};

/// Port to whatever channel resolves human approvals.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Decide the approval outcome for a workflow paused at the gate.
    async fn decide(
        &self,
        workflow_id: &str,
        state: &WorkflowState,
    ) -> DomainResult<ApprovalStatus>;
}

/// Gate returning a fixed decision. The default gate approves, which
/// keeps unattended deployments moving while still recording that the
/// approval phase ran.
#[derive(Debug)]
pub struct StaticApprovalGate {
    decision: ApprovalStatus,
}

impl StaticApprovalGate {
    pub fn new(decision: ApprovalStatus) -> Self {
        Self { decision }
    }

    pub fn approving() -> Self {
        Self::new(ApprovalStatus::Approved)
    }
}

impl Default for StaticApprovalGate {
    fn default() -> Self {
        Self::approving()
    }
}

#[async_trait]
impl ApprovalGate for StaticApprovalGate {
    async fn decide(
        &self,
        _workflow_id: &str,
        _state: &WorkflowState,
    ) -> DomainResult<ApprovalStatus> {
        Ok(self.decision)
    }
}
