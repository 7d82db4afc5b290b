//! Command-line surface.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Agent swarm coordinator.
#[derive(Parser, Debug)]
#[command(name = "quorum", version, about = "Coordinate an agent swarm over workflow graphs")]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to an explicit configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit an objective and wait for the result
    Run {
        /// The objective to execute
        objective: String,

        /// Explicit task type (derived from the objective when omitted)
        #[arg(long)]
        task_type: Option<String>,

        /// Priority: low, medium, high, critical
        #[arg(long)]
        priority: Option<String>,

        /// Context entries as key=value pairs
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        /// Seconds to wait for completion
        #[arg(long, default_value_t = 300)]
        wait_seconds: u64,
    },

    /// List the agent roster and its current status
    Agents,

    /// Show aggregate swarm health
    Health,
}
