//! Configuration loader.
//!
//! Hierarchical merge, lowest to highest precedence:
//! 1. Programmatic defaults
//! 2. `.quorum/config.yaml` (project config)
//! 3. `.quorum/local.yaml` (local overrides)
//! 4. `QUORUM_*` environment variables
//! 5. Bare well-known keys (`MAX_RETRIES`, `WORKFLOW_TIMEOUT_SECONDS`,
//!    `CHECKPOINT_BACKEND`, `LLM_ENDPOINT`, `REPO_ENDPOINT`,
//!    `AUDIT_DB_URL`, `CORS_ORIGINS`)

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{CheckpointBackend, SwarmConfig};

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid max_concurrent_tasks: {0}. Must be at least 1")]
    InvalidMaxConcurrentTasks(usize),

    #[error("Invalid history_bound: {0}. Must be at least 1")]
    InvalidHistoryBound(usize),

    #[error("Invalid poll_interval_ms: {0}. Must be at least 1")]
    InvalidPollInterval(u64),

    #[error("Checkpoint path cannot be empty for the kv backend")]
    EmptyCheckpointPath,

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnvValue { key: String, value: String },
}

/// Loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from project files and the environment.
    pub fn load() -> Result<SwarmConfig> {
        let mut config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(".quorum/config.yaml"))
            .merge(Yaml::file(".quorum/local.yaml"))
            .merge(Env::prefixed("QUORUM_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::apply_well_known_env(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from one explicit file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SwarmConfig> {
        let mut config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::apply_well_known_env(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Apply the bare environment keys recognized by deployments.
    pub fn apply_well_known_env(config: &mut SwarmConfig) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("MAX_RETRIES") {
            config.workflow.max_retries =
                value.parse().map_err(|_| ConfigError::InvalidEnvValue {
                    key: "MAX_RETRIES".into(),
                    value: value.clone(),
                })?;
        }
        if let Ok(value) = std::env::var("WORKFLOW_TIMEOUT_SECONDS") {
            config.workflow.timeout_seconds =
                value.parse().map_err(|_| ConfigError::InvalidEnvValue {
                    key: "WORKFLOW_TIMEOUT_SECONDS".into(),
                    value: value.clone(),
                })?;
        }
        if let Ok(value) = std::env::var("CHECKPOINT_BACKEND") {
            config.checkpoint.backend = match value.to_lowercase().as_str() {
                "memory" => CheckpointBackend::Memory,
                "kv" => CheckpointBackend::Kv,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        key: "CHECKPOINT_BACKEND".into(),
                        value,
                    })
                }
            };
        }
        if let Ok(value) = std::env::var("LLM_ENDPOINT") {
            config.endpoints.llm_endpoint = value;
        }
        if let Ok(value) = std::env::var("REPO_ENDPOINT") {
            config.endpoints.repo_endpoint = value;
        }
        if let Ok(value) = std::env::var("AUDIT_DB_URL") {
            config.endpoints.audit_db_url = Some(value);
        }
        if let Ok(value) = std::env::var("CORS_ORIGINS") {
            config.endpoints.cors_origins = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        Ok(())
    }

    /// Validate configuration after loading.
    pub fn validate(config: &SwarmConfig) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.agents.max_concurrent_tasks == 0 {
            return Err(ConfigError::InvalidMaxConcurrentTasks(
                config.agents.max_concurrent_tasks,
            ));
        }
        if config.bus.history_bound == 0 {
            return Err(ConfigError::InvalidHistoryBound(config.bus.history_bound));
        }
        if config.bus.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval(config.bus.poll_interval_ms));
        }

        if config.checkpoint.backend == CheckpointBackend::Kv && config.checkpoint.path.is_empty() {
            return Err(ConfigError::EmptyCheckpointPath);
        }

        if config.rate_limit.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                config.rate_limit.requests_per_second,
            ));
        }
        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }
        Ok(())
    }
}
