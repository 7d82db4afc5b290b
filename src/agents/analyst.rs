//! Repository analyst executor.
//!
//! Fetches a bounded slice of the repository through the repo collaborator,
//! chunks it, and derives structure, patterns, quality insights, and
//! recommendations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::errors::DomainResult;
use crate::domain::models::chunking::{chunk_file, ChunkKind, ChunkingConfig, CodeChunk};
use crate::domain::models::memory::AgentMemory;
use crate::domain::models::task::{ContextMap, Task};
use crate::domain::ports::repository::RepositoryFetcher;

use super::TaskExecutor;

/// One finding about code quality.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QualityInsight {
    pub file: String,
    pub category: String,
    pub severity: String,
    pub description: String,
}

/// Executor for the repository analyst role.
pub struct AnalystExecutor {
    repo: Arc<dyn RepositoryFetcher>,
    max_files: usize,
    chunking: ChunkingConfig,
}

impl AnalystExecutor {
    /// Default bound on files fetched per analysis.
    pub const DEFAULT_MAX_FILES: usize = 50;

    pub fn new(repo: Arc<dyn RepositoryFetcher>) -> Self {
        Self {
            repo,
            max_files: Self::DEFAULT_MAX_FILES,
            chunking: ChunkingConfig::default(),
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Fetch up to `max_files` files and chunk them. Per-file fetch
    /// failures are skipped with a warning rather than failing the
    /// analysis.
    async fn gather_chunks(&self, git_ref: &str) -> DomainResult<(Vec<String>, Vec<CodeChunk>)> {
        let entries = self.repo.list_tree("", git_ref).await?;
        let mut files = Vec::new();
        let mut chunks = Vec::new();

        for entry in entries.into_iter().take(self.max_files) {
            match self.repo.fetch_file(&entry.path).await {
                Ok(content) => {
                    chunks.extend(chunk_file(&entry.path, &content, &self.chunking));
                    files.push(entry.path);
                }
                Err(err) => {
                    tracing::warn!(path = %entry.path, error = %err, "Skipping unreadable file");
                }
            }
        }
        Ok((files, chunks))
    }

    fn analyze_structure(files: &[String], chunks: &[CodeChunk]) -> ContextMap {
        let file_chunks: Vec<&CodeChunk> =
            chunks.iter().filter(|c| c.kind == ChunkKind::File).collect();
        let total_lines: usize = file_chunks.iter().map(|c| c.line_count()).sum();

        let mut languages: HashMap<&str, usize> = HashMap::new();
        for chunk in &file_chunks {
            *languages.entry(chunk.language.as_str()).or_default() += 1;
        }

        let mut structure = ContextMap::new();
        structure.insert("total_files".into(), json!(files.len()));
        structure.insert("total_lines".into(), json!(total_lines));
        structure.insert("languages".into(), json!(languages));
        structure.insert(
            "average_file_lines".into(),
            json!(if file_chunks.is_empty() {
                0
            } else {
                total_lines / file_chunks.len()
            }),
        );
        structure
    }

    fn detect_patterns(files: &[String], chunks: &[CodeChunk]) -> (ContextMap, Vec<String>) {
        let functions = chunks.iter().filter(|c| c.kind == ChunkKind::Function).count();
        let classes = chunks.iter().filter(|c| c.kind == ChunkKind::Class).count();
        let async_functions = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::Function && c.metadata.is_async)
            .count();
        let test_files = files
            .iter()
            .filter(|f| f.contains("test") || f.contains("spec"))
            .count();

        let mut names: Vec<String> = Vec::new();
        if async_functions > 0 {
            names.push("async_concurrency".into());
        }
        if classes > 0 {
            names.push("type_driven_design".into());
        }
        if test_files > 0 {
            names.push("test_coverage_present".into());
        }

        let mut patterns = ContextMap::new();
        patterns.insert("functions".into(), json!(functions));
        patterns.insert("classes".into(), json!(classes));
        patterns.insert("async_functions".into(), json!(async_functions));
        patterns.insert("test_files".into(), json!(test_files));
        patterns.insert("names".into(), json!(names));
        (patterns, names)
    }

    fn assess_quality(chunks: &[CodeChunk]) -> Vec<QualityInsight> {
        let mut insights = Vec::new();
        for chunk in chunks {
            match chunk.kind {
                ChunkKind::Function if chunk.line_count() > 100 => {
                    insights.push(QualityInsight {
                        file: chunk.file.clone(),
                        category: "complexity".into(),
                        severity: "warning".into(),
                        description: format!(
                            "function {} spans {} lines",
                            chunk.metadata.declared_name.as_deref().unwrap_or("<anonymous>"),
                            chunk.line_count()
                        ),
                    });
                }
                ChunkKind::File if chunk.line_count() > 500 => {
                    insights.push(QualityInsight {
                        file: chunk.file.clone(),
                        category: "structure".into(),
                        severity: "info".into(),
                        description: format!("file spans {} lines", chunk.line_count()),
                    });
                }
                _ => {}
            }
        }
        insights
    }

    fn recommendations(patterns: &[String], insights: &[QualityInsight]) -> Vec<String> {
        let mut recommendations = Vec::new();
        if !patterns.iter().any(|p| p == "test_coverage_present") {
            recommendations.push("Add automated tests; none were detected".to_string());
        }
        if insights.iter().any(|i| i.category == "complexity") {
            recommendations.push("Split long functions flagged by the complexity scan".to_string());
        }
        if insights.iter().any(|i| i.category == "structure") {
            recommendations.push("Consider breaking up oversized files".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("Structure looks consistent; keep current conventions".to_string());
        }
        recommendations
    }
}

#[async_trait]
impl TaskExecutor for AnalystExecutor {
    async fn execute(&self, task: &Task, memory: &mut AgentMemory) -> DomainResult<ContextMap> {
        let git_ref = task
            .context
            .get("ref")
            .and_then(|v| v.as_str())
            .unwrap_or("main")
            .to_string();

        let (files, chunks) = self.gather_chunks(&git_ref).await?;
        tracing::info!(
            task_id = %task.id,
            files = files.len(),
            chunks = chunks.len(),
            git_ref = %git_ref,
            "Repository analysis gathered chunks"
        );
        memory.store_working("chunk_count", json!(chunks.len()));

        let structure = Self::analyze_structure(&files, &chunks);
        let (patterns, pattern_names) = Self::detect_patterns(&files, &chunks);
        let insights = Self::assess_quality(&chunks);
        let recommendations = Self::recommendations(&pattern_names, &insights);

        let mut result = ContextMap::new();
        result.insert("structure".into(), json!(structure));
        result.insert("patterns".into(), json!(patterns));
        result.insert("quality_insights".into(), json!(insights));
        result.insert("recommendations".into(), json!(recommendations));
        result.insert("relevant_files".into(), json!(files));
        result.insert("code_patterns".into(), json!(pattern_names));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskType;
    use crate::domain::ports::repository::RepoEntry;

    /// In-memory repository fixture.
    struct FakeRepo {
        files: Vec<(String, String)>,
    }

    #[async_trait]
    impl RepositoryFetcher for FakeRepo {
        async fn list_tree(&self, _path: &str, _git_ref: &str) -> DomainResult<Vec<RepoEntry>> {
            Ok(self
                .files
                .iter()
                .map(|(path, content)| RepoEntry {
                    path: path.clone(),
                    size: content.len() as u64,
                })
                .collect())
        }

        async fn fetch_file(&self, path: &str) -> DomainResult<String> {
            self.files
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, c)| c.clone())
                .ok_or_else(|| crate::domain::errors::DomainError::ExecutionFailed(
                    format!("missing {path}"),
                ))
        }
    }

    fn fake_repo() -> Arc<FakeRepo> {
        Arc::new(FakeRepo {
            files: vec![
                (
                    "src/service.py".to_string(),
                    "class Service:\n    async def run(self):\n        return 1\n".to_string(),
                ),
                (
                    "tests/test_service.py".to_string(),
                    "def test_run():\n    assert True\n".to_string(),
                ),
            ],
        })
    }

    #[tokio::test]
    async fn test_analysis_result_shape() {
        let executor = AnalystExecutor::new(fake_repo());
        let task = Task::new("analyze", "analyze repository", TaskType::RepositoryAnalysis);
        let mut memory = AgentMemory::new(10);

        let result = executor.execute(&task, &mut memory).await.unwrap();
        for key in ["structure", "patterns", "quality_insights", "recommendations"] {
            assert!(result.contains_key(key), "missing key {key}");
        }
        let structure = result.get("structure").unwrap();
        assert_eq!(structure.get("total_files"), Some(&json!(2)));
        let patterns = result.get("patterns").unwrap();
        assert_eq!(patterns.get("test_files"), Some(&json!(1)));
        assert_eq!(patterns.get("async_functions"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_max_files_bound() {
        let files: Vec<(String, String)> = (0..10)
            .map(|i| (format!("f{i}.txt"), "x\n".to_string()))
            .collect();
        let executor =
            AnalystExecutor::new(Arc::new(FakeRepo { files })).with_max_files(3);
        let task = Task::new("analyze", "analyze", TaskType::RepositoryAnalysis);
        let mut memory = AgentMemory::new(10);

        let result = executor.execute(&task, &mut memory).await.unwrap();
        let relevant = result.get("relevant_files").unwrap().as_array().unwrap();
        assert_eq!(relevant.len(), 3);
    }

    #[tokio::test]
    async fn test_long_function_flagged() {
        let body: String = (0..150).map(|i| format!("    x = {i}\n")).collect();
        let content = format!("def enormous():\n{body}");
        let executor = AnalystExecutor::new(Arc::new(FakeRepo {
            files: vec![("big.py".to_string(), content)],
        }));
        let task = Task::new("analyze", "analyze", TaskType::RepositoryAnalysis);
        let mut memory = AgentMemory::new(10);

        let result = executor.execute(&task, &mut memory).await.unwrap();
        let insights = result.get("quality_insights").unwrap().as_array().unwrap();
        assert!(insights
            .iter()
            .any(|i| i.get("category") == Some(&json!("complexity"))));
        let recommendations = result.get("recommendations").unwrap().as_array().unwrap();
        assert!(recommendations
            .iter()
            .any(|r| r.as_str().unwrap().contains("long functions")));
    }
}
