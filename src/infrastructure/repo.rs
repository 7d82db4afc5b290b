//! HTTP repository fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::repository::{RepoEntry, RepositoryFetcher};

#[derive(Debug, Deserialize)]
struct TreeResponse {
    entries: Vec<RepoEntry>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    content: String,
}

/// HTTP client for the repository collaborator.
pub struct HttpRepositoryFetcher {
    http: Client,
    endpoint: String,
}

impl HttpRepositoryFetcher {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn unavailable(context: &str, err: impl std::fmt::Display) -> DomainError {
        DomainError::CollaboratorUnavailable(format!("{context}: {err}"))
    }
}

#[async_trait]
impl RepositoryFetcher for HttpRepositoryFetcher {
    async fn list_tree(&self, path: &str, git_ref: &str) -> DomainResult<Vec<RepoEntry>> {
        let response = self
            .http
            .get(format!("{}/repo/tree", self.endpoint))
            .query(&[("path", path), ("ref", git_ref)])
            .send()
            .await
            .map_err(|err| Self::unavailable("repo tree request", err))?
            .error_for_status()
            .map_err(|err| Self::unavailable("repo tree response", err))?;

        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|err| DomainError::SerializationError(err.to_string()))?;
        Ok(tree.entries)
    }

    async fn fetch_file(&self, path: &str) -> DomainResult<String> {
        let response = self
            .http
            .get(format!("{}/repo/file", self.endpoint))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|err| Self::unavailable("repo file request", err))?
            .error_for_status()
            .map_err(|err| Self::unavailable("repo file response", err))?;

        let file: FileResponse = response
            .json()
            .await
            .map_err(|err| DomainError::SerializationError(err.to_string()))?;
        Ok(file.content)
    }
}
