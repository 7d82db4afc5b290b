//! Domain models.
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure
//! concerns.

pub mod chunking;
pub mod config;
pub mod memory;
pub mod message;
pub mod plan;
pub mod task;
pub mod workflow;

pub use chunking::{chunk_file, ChunkKind, ChunkingConfig, CodeChunk, Language};
pub use config::{CheckpointBackend, SwarmConfig};
pub use memory::{AgentMemory, MemoryTier};
pub use message::{Message, MessageKind};
pub use plan::{Plan, PlanStep, RiskLevel, StepComplexity, TechMaturity, TechnologyChoice};
pub use task::{ContextMap, Task, TaskPriority, TaskStatus, TaskType};
pub use workflow::{
    ApprovalStatus, Phase, PhaseExecution, PhaseStatus, WorkflowMetrics, WorkflowResult,
    WorkflowState, WorkflowStatus,
};
