//! Retrieval-augmented-generation port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::chunking::CodeChunk;

/// What kind of context a retrieval targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    CodeImplementation,
    ApiUsage,
    DesignPatterns,
    Documentation,
}

/// Retrieval strategy hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Semantic,
    Keyword,
    HybridSearch,
}

/// A retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub query: String,
    pub context_types: Vec<ContextType>,
    pub strategy: RetrievalStrategy,
    pub max_results: usize,
    pub filters: std::collections::HashMap<String, String>,
}

impl RetrievalQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context_types: vec![ContextType::CodeImplementation],
            strategy: RetrievalStrategy::HybridSearch,
            max_results: 10,
            filters: std::collections::HashMap::new(),
        }
    }
}

/// Retrieval result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<CodeChunk>,
    pub augmented_context: String,
    pub sources: Vec<String>,
    pub confidence: f64,
}

/// Port to the retrieval collaborator.
#[async_trait]
pub trait RetrievalEngine: Send + Sync {
    async fn retrieve(&self, query: RetrievalQuery) -> DomainResult<RetrievalResult>;
}
