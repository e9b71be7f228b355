// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Async Infrastructure Worker
//!
//! Long-running queue-group consumer that drives the provisioning engine
//! for create/delete jobs. Runs under the agent identity so every status
//! and error transition flows through the orchestration service.
//!
//! Provisioning failures are never thrown back across the bus: the worker
//! persists a FAILED status with the error detail on the resource and
//! moves on to the next message. Shutdown is an explicit cancellation
//! signal; the subscription task exits deterministically when it fires.

use crate::application::infrastructure_service::{
    InfrastructureAsyncHandler, InfrastructureService,
};
use crate::application::quoin_service::QuoinService;
use crate::domain::error::OrchestrationError;
use crate::domain::infrastructure::Infrastructure;
use crate::domain::job::Subject;
use crate::domain::provisioning::{render_var_file, ProvisionJob, ProvisioningEngine};
use crate::domain::quoin::{archive_id_from_uri, ArchiveId};
use crate::domain::status::Status;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct InfrastructureWorker {
    infrastructure_service: Arc<dyn InfrastructureService>,
    quoin_service: Arc<dyn QuoinService>,
    engine: Arc<dyn ProvisioningEngine>,
    /// Base URL of the state API, e.g. `http://eve:8088`. The remote
    /// state endpoint for a job is `<base>/infrastructure/<name>/state`.
    state_endpoint_base: String,
}

impl InfrastructureWorker {
    pub fn new(
        infrastructure_service: Arc<dyn InfrastructureService>,
        quoin_service: Arc<dyn QuoinService>,
        engine: Arc<dyn ProvisioningEngine>,
        state_endpoint_base: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            infrastructure_service,
            quoin_service,
            engine,
            state_endpoint_base,
        })
    }

    /// Subscribe on `subject` and consume jobs until `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        subject: Subject,
        shutdown: CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let worker = Arc::clone(&self);
        let handler: InfrastructureAsyncHandler = Arc::new(move |infra| {
            let worker = Arc::clone(&worker);
            let job: BoxFuture<'static, ()> =
                Box::pin(async move { worker.process(subject, infra).await });
            job
        });

        let handle = self
            .infrastructure_service
            .subscribe_async_proc(subject, handler, shutdown)
            .await?;
        info!("listening on [{}]", subject);

        if let Err(err) = handle.await {
            error!("subscription task for [{}] aborted: {}", subject, err);
        }
        Ok(())
    }

    /// Handle one job. All failures end up recorded on the resource.
    pub async fn process(&self, subject: Subject, infra: Infrastructure) {
        let name = infra.name.clone();
        info!("start infrastructure {} process for {}", subject, name);

        let outcome = match subject {
            Subject::CreateInfra => self.create(&infra).await,
            Subject::DeleteInfra => self.delete(&infra).await,
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = self
                    .infrastructure_service
                    .record_infrastructure_error(&name, None)
                    .await
                {
                    error!("failed to clear error on {}: {}", name, err);
                }
                info!("{} done for {}", subject, name);
            }
            Err(err) => {
                error!("{} failed for {}: {}", subject, name, err);
                if let Err(record_err) = self
                    .infrastructure_service
                    .record_infrastructure_error(&name, Some(err.to_string()))
                    .await
                {
                    error!("failed to record error on {}: {}", name, record_err);
                }
            }
        }
    }

    async fn create(&self, infra: &Infrastructure) -> Result<(), OrchestrationError> {
        self.infrastructure_service
            .update_infrastructure_status(&infra.name, Status::Running)
            .await?;
        let job = self.provision_job(infra).await?;
        self.engine.apply(&job).await?;
        self.infrastructure_service
            .update_infrastructure_status(&infra.name, Status::Deployed)
            .await?;
        Ok(())
    }

    async fn delete(&self, infra: &Infrastructure) -> Result<(), OrchestrationError> {
        self.infrastructure_service
            .update_infrastructure_status(&infra.name, Status::Running)
            .await?;
        let job = self.provision_job(infra).await?;
        self.engine.destroy(&job).await?;
        self.infrastructure_service
            .update_infrastructure_status(&infra.name, Status::Destroyed)
            .await?;
        Ok(())
    }

    /// Resolve the archive behind the job's quoin snapshot and assemble
    /// the engine input.
    async fn provision_job(
        &self,
        infra: &Infrastructure,
    ) -> Result<ProvisionJob, OrchestrationError> {
        let uri = infra.quoin.archive_uri.as_deref().ok_or_else(|| {
            OrchestrationError::Validation(format!(
                "infrastructure {} snapshot carries no archive uri",
                infra.name
            ))
        })?;
        let id = archive_id_from_uri(uri)
            .ok_or_else(|| {
                OrchestrationError::Validation(format!(
                    "infrastructure {} snapshot carries an unresolvable archive uri",
                    infra.name
                ))
            })
            .and_then(|raw| {
                ArchiveId::from_string(raw).map_err(|err| {
                    OrchestrationError::Validation(format!("invalid archive id {raw}: {err}"))
                })
            })?;

        let archive = self.quoin_service.get_quoin_archive(id).await?;
        info!(
            "infrastructure {} gets quoin archive {} ({})",
            infra.name, id, archive.quoin_name
        );

        Ok(ProvisionJob {
            name: infra.name.clone(),
            modules: archive.modules,
            var_file: render_var_file(&infra.variables),
            remote_state_url: format!(
                "{}/infrastructure/{}/state",
                self.state_endpoint_base.trim_end_matches('/'),
                infra.name
            ),
            provider_slug: infra.provider_slug.clone(),
        })
    }
}
