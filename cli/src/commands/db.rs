// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Database management commands

use aegis_provisioner_core::infrastructure::config::StoreConfig;
use aegis_provisioner_core::infrastructure::db::Database;
use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand)]
pub enum DbCommand {
    /// Create the provisioner tables when they do not exist yet
    Init,
}

pub async fn handle_command(command: DbCommand) -> Result<()> {
    match command {
        DbCommand::Init => {
            let store = StoreConfig::from_env();
            let database = Database::new(&store.url)
                .await
                .context("Failed to connect to the document store")?;
            database
                .init_schema()
                .await
                .context("Failed to initialize the schema")?;
            info!("provisioner database initialized");
            Ok(())
        }
    }
}
