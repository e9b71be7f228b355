// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Provisioner CLI
//!
//! The `aegisp` binary hosts the async provisioning agents and the
//! database bootstrap.
//!
//! ## Commands
//!
//! - `aegisp agent create|delete` - Run a worker consuming lifecycle jobs
//! - `aegisp db init` - Create the provisioner tables

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;

use commands::{AgentCommand, DbCommand};

/// AEGIS Provisioner - infrastructure lifecycle agents
#[derive(Parser)]
#[command(name = "aegisp")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a provisioning agent
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Database management
    #[command(name = "db")]
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before reading any configuration.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Agent { command } => commands::agent::handle_command(command).await,
        Commands::Db { command } => commands::db::handle_command(command).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
