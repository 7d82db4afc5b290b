//! Quorum CLI entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use quorum::cli::{commands, Cli, Commands};
use quorum::domain::models::config::CheckpointBackend;
use quorum::domain::ports::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use quorum::infrastructure::{
    ConfigLoader, HttpLanguageModel, HttpRepositoryFetcher, SqliteAuditSink,
    SqliteCheckpointStore,
};
use quorum::services::swarm_manager::{SwarmCollaborators, SwarmManager};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _guard = quorum::infrastructure::init_logging(&config.logging)
        .context("Failed to initialize logging")?;

    let repository = Arc::new(
        HttpRepositoryFetcher::new(config.endpoints.repo_endpoint.clone())
            .context("Failed to build repository client")?,
    );
    let language_model = Arc::new(
        HttpLanguageModel::new(
            config.endpoints.llm_endpoint.clone(),
            &config.rate_limit,
            config.retry.clone(),
        )
        .context("Failed to build language model client")?,
    );

    let checkpoints: Arc<dyn CheckpointStore> = match config.checkpoint.backend {
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::new()),
        CheckpointBackend::Kv => Arc::new(
            SqliteCheckpointStore::open(&config.checkpoint.path)
                .await
                .context("Failed to open checkpoint store")?,
        ),
    };

    let mut collaborators =
        SwarmCollaborators::new(repository, language_model).with_checkpoints(checkpoints);
    if let Some(audit_url) = &config.endpoints.audit_db_url {
        let sink = SqliteAuditSink::open(audit_url)
            .await
            .context("Failed to open audit store")?;
        collaborators = collaborators.with_audit(Arc::new(sink));
    }

    let manager = SwarmManager::new(config, collaborators);
    manager.init().context("Swarm initialization failed")?;

    let outcome = match &cli.command {
        Commands::Run {
            objective,
            task_type,
            priority,
            context,
            wait_seconds,
        } => {
            commands::handle_run(
                &manager,
                objective,
                task_type.as_deref(),
                priority.as_deref(),
                context,
                *wait_seconds,
                cli.json,
            )
            .await
        }
        Commands::Agents => commands::handle_agents(&manager, cli.json).await,
        Commands::Health => commands::handle_health(&manager, cli.json),
    };

    manager.shutdown().await;
    outcome
}
