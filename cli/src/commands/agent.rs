// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning agent commands
//!
//! Composition root for the async workers: wires config, store, bus,
//! secret provider and engine into the orchestration services and blocks
//! on the worker loop until a shutdown signal arrives.

use aegis_provisioner_core::application::infrastructure_service::{
    InfrastructureService, StandardInfrastructureService,
};
use aegis_provisioner_core::application::quoin_service::{QuoinService, StandardQuoinService};
use aegis_provisioner_core::application::worker::InfrastructureWorker;
use aegis_provisioner_core::domain::authorization::User;
use aegis_provisioner_core::domain::bus::MessageBus;
use aegis_provisioner_core::domain::job::Subject;
use aegis_provisioner_core::domain::provisioning::ProvisioningEngine;
use aegis_provisioner_core::domain::repository::{
    InfrastructureRepository, QuoinArchiveRepository, QuoinRepository,
};
use aegis_provisioner_core::domain::secrets::SecretProvider;
use aegis_provisioner_core::infrastructure::config::{
    ApiEndpointConfig, BusConfig, EngineConfig, StoreConfig,
};
use aegis_provisioner_core::infrastructure::db::Database;
use aegis_provisioner_core::infrastructure::message_bus::NatsMessageBus;
use aegis_provisioner_core::infrastructure::repositories::postgres::{
    PostgresInfrastructureRepository, PostgresQuoinArchiveRepository, PostgresQuoinRepository,
};
use aegis_provisioner_core::infrastructure::terraform::TerraformEngine;
use aegis_provisioner_core::infrastructure::vault::VaultSecretProvider;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Consume create-infra jobs and apply them
    Create,

    /// Consume delete-infra jobs and destroy them
    Delete,
}

pub async fn handle_command(command: AgentCommand) -> Result<()> {
    let subject = match command {
        AgentCommand::Create => Subject::CreateInfra,
        AgentCommand::Delete => Subject::DeleteInfra,
    };
    run_worker(subject).await
}

async fn run_worker(subject: Subject) -> Result<()> {
    let endpoint = ApiEndpointConfig::from_env();
    let store = StoreConfig::from_env();
    let bus_config = BusConfig::from_env();
    let engine_config = EngineConfig::from_env();

    let database = Database::new(&store.url)
        .await
        .context("Failed to connect to the document store")?;
    let pool = database.get_pool().clone();
    let quoins: Arc<dyn QuoinRepository> = Arc::new(PostgresQuoinRepository::new(pool.clone()));
    let archives: Arc<dyn QuoinArchiveRepository> =
        Arc::new(PostgresQuoinArchiveRepository::new(pool.clone()));
    let infrastructures: Arc<dyn InfrastructureRepository> =
        Arc::new(PostgresInfrastructureRepository::new(pool));

    let bus: Arc<dyn MessageBus> = Arc::new(NatsMessageBus::new(bus_config));
    let secrets: Arc<dyn SecretProvider> = Arc::new(
        VaultSecretProvider::from_env().context("Failed to build the secret store client")?,
    );
    let engine: Arc<dyn ProvisioningEngine> =
        Arc::new(TerraformEngine::new(engine_config, secrets));

    let agent = User::agent();
    let quoin_service: Arc<dyn QuoinService> = Arc::new(StandardQuoinService::new(
        agent.clone(),
        quoins.clone(),
        archives,
        infrastructures.clone(),
        engine.clone(),
        endpoint.base_url(),
    ));
    let infrastructure_service: Arc<dyn InfrastructureService> =
        Arc::new(StandardInfrastructureService::new(
            agent,
            infrastructures,
            quoins,
            bus,
        ));

    let worker = InfrastructureWorker::new(
        infrastructure_service,
        quoin_service,
        engine,
        endpoint.base_url(),
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal.cancel();
        }
    });

    worker.run(subject, shutdown).await?;
    Ok(())
}
