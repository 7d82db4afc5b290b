//! Repository fetch port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// A file entry in a repository tree listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEntry {
    pub path: String,
    pub size: u64,
}

/// Port to the repository collaborator.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// List files under a path at a ref.
    async fn list_tree(&self, path: &str, git_ref: &str) -> DomainResult<Vec<RepoEntry>>;

    /// Fetch one file's content.
    async fn fetch_file(&self, path: &str) -> DomainResult<String>;
}
