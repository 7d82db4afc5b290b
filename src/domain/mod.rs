//! Domain layer.
//!
//! Core models and ports. Framework-agnostic: no HTTP, no database,
//! no terminal concerns.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
