//! Language model port.
//!
//! The provider is opaque to the core: it must honor per-role prompt
//! templates and callers must tolerate `fallback_used` results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// Completion request sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The content to complete over
    pub content: String,
    /// Named per-role prompt template
    pub prompt_template: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Model identifier (provider-specific)
    pub model: String,
}

impl CompletionRequest {
    pub fn new(content: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            prompt_template: prompt_template.into(),
            max_tokens: 2000,
            model: "default".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Completion returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub summary: String,
    pub model_used: String,
    pub provider: String,
    pub token_count: u32,
    pub processing_time_ms: u64,
    /// True when the provider fell back to a secondary model
    #[serde(default)]
    pub fallback_used: bool,
}

/// Port to the language-model collaborator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> DomainResult<Completion>;
}
