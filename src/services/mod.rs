//! Service layer: the message bus, reconciliation, request parsing, the
//! swarm manager, and the workflow engine.

pub mod message_bus;
pub mod reconciliation;
pub mod request_parser;
pub mod swarm_manager;
pub mod workflow_engine;

pub use message_bus::{BusMetrics, CollectedResponse, Coordination, MessageBus, ResponseStatus};
pub use reconciliation::{Reconciliation, ResolutionStrategy, ResultCandidate};
pub use request_parser::{parse_request, ParsedRequest};
pub use swarm_manager::{SwarmCollaborators, SwarmManager, SwarmRequest, TaskRecord};
pub use workflow_engine::WorkflowEngine;
