//! Quorum - agent swarm coordinator.
//!
//! Executes complex objectives by coordinating a pool of specialized
//! cooperating agents under a stateful workflow graph:
//! - Typed task and message records with checked status transitions
//! - Agent runtime with capability-based acceptance and tiered memory
//! - Message bus with FIFO delivery, groups, and result reconciliation
//! - Swarm manager routing requests to direct, fan-out, or workflow paths
//! - Workflow engine with parallel planning, conditional edges, bounded
//!   retries, deadlines, and checkpointed resumption

pub mod agents;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::config::SwarmConfig;
pub use services::swarm_manager::SwarmManager;
