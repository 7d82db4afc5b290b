//! Message domain model.
//!
//! Messages are the envelopes routed between agents through the bus.
//! They are immutable after construction: the bus appends them to its
//! queue on send, removes them after delivery, and retains a bounded
//! history for diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::ContextMap;

/// Type tag of an inter-agent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ask another agent to collaborate on related work
    CollaborationRequest,
    /// Reply accepting a collaboration request, carrying capabilities
    CollaborationAccepted,
    /// Carry a task to the agent selected by coordination
    TaskAssignment,
    /// Reply to an assignment: accepted or rejected
    TaskResponse,
    /// Ask an agent for its status snapshot
    StatusInquiry,
    /// Reply carrying a status snapshot
    StatusResponse,
    /// Group lifecycle notification
    GroupCreated,
    /// Quiet tick emitted by the bus keep-alive task
    KeepAlive,
    /// Application-defined message type
    Custom(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CollaborationRequest => "collaboration_request",
            Self::CollaborationAccepted => "collaboration_accepted",
            Self::TaskAssignment => "task_assignment",
            Self::TaskResponse => "task_response",
            Self::StatusInquiry => "status_inquiry",
            Self::StatusResponse => "status_response",
            Self::GroupCreated => "group_created",
            Self::KeepAlive => "keep_alive",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An inter-agent communication envelope. Immutable after send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier
    pub id: Uuid,
    /// Sending agent id, or "system" for bus-originated messages
    pub sender_id: String,
    /// Target agent id; None means broadcast / group-scoped
    pub recipient_id: Option<String>,
    /// Type tag
    pub kind: MessageKind,
    /// Payload
    pub content: ContextMap,
    /// When sent
    pub timestamp: DateTime<Utc>,
    /// Related task, if any
    pub task_id: Option<Uuid>,
    /// Whether the sender expects a reply
    pub requires_response: bool,
}

impl Message {
    /// Sender id used for bus-originated messages.
    pub const SYSTEM_SENDER: &'static str = "system";

    /// Create a directed message.
    pub fn direct(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        kind: MessageKind,
        content: ContextMap,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            recipient_id: Some(recipient_id.into()),
            kind,
            content,
            timestamp: Utc::now(),
            task_id: None,
            requires_response: false,
        }
    }

    /// Create a broadcast message (no fixed recipient).
    pub fn broadcast(sender_id: impl Into<String>, kind: MessageKind, content: ContextMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            recipient_id: None,
            kind,
            content,
            timestamp: Utc::now(),
            task_id: None,
            requires_response: false,
        }
    }

    /// Create a system-originated message.
    pub fn from_system(
        recipient_id: impl Into<String>,
        kind: MessageKind,
        content: ContextMap,
    ) -> Self {
        Self::direct(Self::SYSTEM_SENDER, recipient_id, kind, content)
    }

    /// Attach a related task id.
    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Mark as expecting a reply.
    pub fn expecting_response(mut self) -> Self {
        self.requires_response = true;
        self
    }
}
