//! Domain ports (interfaces) to external collaborators.

pub mod approval;
pub mod audit;
pub mod checkpoint;
pub mod language_model;
pub mod repository;
pub mod retrieval;

pub use approval::{ApprovalGate, StaticApprovalGate};
pub use audit::{AuditRecord, AuditSink, NullAuditSink};
pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use language_model::{Completion, CompletionRequest, LanguageModel};
pub use repository::{RepoEntry, RepositoryFetcher};
pub use retrieval::{ContextType, RetrievalEngine, RetrievalQuery, RetrievalResult, RetrievalStrategy};
