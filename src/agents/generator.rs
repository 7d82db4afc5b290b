//! Generation-side executors.
//!
//! Code generation, debugging, optimization, and quality assessment are
//! one executor type over the language-model port, differentiated by a
//! mode value with its own prompt template and output key.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::errors::DomainResult;
use crate::domain::models::memory::AgentMemory;
use crate::domain::models::task::{ContextMap, Task};
use crate::domain::ports::language_model::{CompletionRequest, LanguageModel};

use super::TaskExecutor;

/// Which generation-side phase this executor serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode {
    Generate,
    Debug,
    Optimize,
    Assess,
}

impl GeneratorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Debug => "debug",
            Self::Optimize => "optimize",
            Self::Assess => "assess",
        }
    }

    fn prompt_template(&self) -> &'static str {
        match self {
            Self::Generate => "code_generation",
            Self::Debug => "debugging",
            Self::Optimize => "optimization",
            Self::Assess => "quality_assessment",
        }
    }
}

/// Executor for the generator / debugger / optimizer / assessor roles.
pub struct GeneratorExecutor {
    mode: GeneratorMode,
    llm: Arc<dyn LanguageModel>,
    model: String,
    /// Whether assessment marks results as needing human approval
    request_approval: bool,
}

impl GeneratorExecutor {
    pub fn new(mode: GeneratorMode, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            mode,
            llm,
            model: "default".to_string(),
            request_approval: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_approval_requests(mut self, request_approval: bool) -> Self {
        self.request_approval = request_approval;
        self
    }

    fn context_str<'a>(task: &'a Task, key: &str) -> Option<&'a str> {
        task.context.get(key).and_then(|v| v.as_str())
    }

    /// Build the completion content for the current mode from the task
    /// context the engine passed along.
    fn completion_content(&self, task: &Task) -> String {
        match self.mode {
            GeneratorMode::Generate => {
                let plan = task
                    .context
                    .get("selected_plan")
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                format!("Task: {}\nPlan: {plan}", task.description)
            }
            GeneratorMode::Debug => Self::context_str(task, "generated_code")
                .unwrap_or(task.description.as_str())
                .to_string(),
            GeneratorMode::Optimize => Self::context_str(task, "debugged_code")
                .or_else(|| Self::context_str(task, "generated_code"))
                .unwrap_or(task.description.as_str())
                .to_string(),
            GeneratorMode::Assess => Self::context_str(task, "optimized_code")
                .or_else(|| Self::context_str(task, "generated_code"))
                .unwrap_or(task.description.as_str())
                .to_string(),
        }
    }
}

#[async_trait]
impl TaskExecutor for GeneratorExecutor {
    async fn execute(&self, task: &Task, memory: &mut AgentMemory) -> DomainResult<ContextMap> {
        let content = self.completion_content(task);
        let request = CompletionRequest::new(content, self.mode.prompt_template())
            .with_model(self.model.clone());
        let completion = self.llm.complete(request).await?;
        if completion.fallback_used {
            tracing::warn!(
                task_id = %task.id,
                model = %completion.model_used,
                "Provider fell back to a secondary model"
            );
        }
        memory.store_working("model_used", json!(completion.model_used));

        let mut result = ContextMap::new();
        result.insert("model_used".into(), json!(completion.model_used));
        result.insert("fallback_used".into(), json!(completion.fallback_used));
        match self.mode {
            GeneratorMode::Generate => {
                result.insert("code".into(), json!(completion.summary));
            }
            GeneratorMode::Debug => {
                result.insert("debugged_code".into(), json!(completion.summary));
            }
            GeneratorMode::Optimize => {
                result.insert("optimized_code".into(), json!(completion.summary));
            }
            GeneratorMode::Assess => {
                // Crude static score: clean output rates higher than
                // output still carrying error markers.
                let score = if completion.summary.to_lowercase().contains("error") {
                    5.0
                } else {
                    8.5
                };
                result.insert(
                    "assessment".into(),
                    json!({
                        "summary": completion.summary,
                        "score": score,
                        "issues": [],
                    }),
                );
                result.insert(
                    "requires_human_approval".into(),
                    json!(self.request_approval),
                );
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskType;
    use crate::domain::ports::language_model::Completion;

    /// Language model fixture echoing a fixed summary.
    struct FakeModel {
        summary: String,
        fallback: bool,
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn complete(&self, request: CompletionRequest) -> DomainResult<Completion> {
            Ok(Completion {
                summary: self.summary.clone(),
                model_used: request.model,
                provider: "fake".into(),
                token_count: 10,
                processing_time_ms: 1,
                fallback_used: self.fallback,
            })
        }
    }

    fn model(summary: &str) -> Arc<FakeModel> {
        Arc::new(FakeModel {
            summary: summary.to_string(),
            fallback: false,
        })
    }

    #[tokio::test]
    async fn test_generate_mode_emits_code() {
        let executor = GeneratorExecutor::new(GeneratorMode::Generate, model("fn main() {}"));
        let task = Task::new("gen", "implement rate limiter", TaskType::CodeGeneration)
            .with_context_value("selected_plan", json!({"steps": 1}));
        let mut memory = AgentMemory::new(10);

        let result = executor.execute(&task, &mut memory).await.unwrap();
        assert_eq!(result.get("code"), Some(&json!("fn main() {}")));
        assert_eq!(result.get("fallback_used"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_debug_mode_reads_generated_code() {
        let executor = GeneratorExecutor::new(GeneratorMode::Debug, model("fixed code"));
        let task = Task::new("dbg", "debug", TaskType::Debugging)
            .with_context_value("generated_code", json!("broken code with error"));
        let mut memory = AgentMemory::new(10);

        let result = executor.execute(&task, &mut memory).await.unwrap();
        assert_eq!(result.get("debugged_code"), Some(&json!("fixed code")));
    }

    #[tokio::test]
    async fn test_assess_mode_scores_and_flags_approval() {
        let executor = GeneratorExecutor::new(GeneratorMode::Assess, model("looks solid"))
            .with_approval_requests(true);
        let task = Task::new("qa", "assess", TaskType::QualityAssessment)
            .with_context_value("optimized_code", json!("clean code"));
        let mut memory = AgentMemory::new(10);

        let result = executor.execute(&task, &mut memory).await.unwrap();
        let assessment = result.get("assessment").unwrap();
        assert_eq!(assessment.get("score"), Some(&json!(8.5)));
        assert_eq!(result.get("requires_human_approval"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_assess_mode_penalizes_error_markers() {
        let executor = GeneratorExecutor::new(GeneratorMode::Assess, model("error in module"));
        let task = Task::new("qa", "assess", TaskType::QualityAssessment);
        let mut memory = AgentMemory::new(10);

        let result = executor.execute(&task, &mut memory).await.unwrap();
        let assessment = result.get("assessment").unwrap();
        assert_eq!(assessment.get("score"), Some(&json!(5.0)));
    }
}
