// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure Application Service
//!
//! The synchronous-facing half of the lifecycle engine: validates and
//! persists Infrastructure records, enforces the status state machine, and
//! publishes create/delete jobs. Job publication is kept on this service
//! so authorization and persistence stay on the same call path.
//!
//! The async workers call back into the same methods (under the agent
//! identity) for every status/state transition, preserving a single
//! authorization and validation choke point over the store.

use crate::domain::authorization::{Authorization, User};
use crate::domain::bus::MessageBus;
use crate::domain::error::OrchestrationError;
use crate::domain::infrastructure::{Infrastructure, InfrastructureError};
use crate::domain::job::Subject;
use crate::domain::quoin::{archive_id_from_uri, Quoin, QuoinVar};
use crate::domain::repository::{InfrastructureRepository, QuoinRepository};
use crate::domain::status::Status;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handler invoked once per consumed job message.
pub type InfrastructureAsyncHandler =
    Arc<dyn Fn(Infrastructure) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CreateInfrastructureRequest {
    pub name: String,
    pub quoin_name: String,
    pub variables: Vec<QuoinVar>,
    pub provider_slug: String,
}

#[async_trait]
pub trait InfrastructureService: Send + Sync {
    async fn get_infrastructure(&self, name: &str) -> Result<Infrastructure, OrchestrationError>;

    async fn get_infrastructure_state(
        &self,
        name: &str,
    ) -> Result<HashMap<String, serde_json::Value>, OrchestrationError>;

    /// Validate the quoin reference, persist at VALIDATED, and publish a
    /// CREATE job. Re-creation of an existing record is permitted only
    /// when its status is not RUNNING, DEPLOYED or OBSOLETED.
    async fn create_infrastructure(
        &self,
        request: CreateInfrastructureRequest,
    ) -> Result<Infrastructure, OrchestrationError>;

    /// Require non-empty state and a non-RUNNING status, set RUNNING, and
    /// publish a DELETE job with the state stripped from the snapshot.
    async fn delete_infrastructure(&self, name: &str) -> Result<(), OrchestrationError>;

    async fn update_infrastructure_state(
        &self,
        name: &str,
        state: HashMap<String, serde_json::Value>,
    ) -> Result<(), OrchestrationError>;

    async fn update_infrastructure_status(
        &self,
        name: &str,
        status: Status,
    ) -> Result<(), OrchestrationError>;

    /// Record (or clear, with `None`) the last worker failure on the
    /// resource. Recording a failure also moves the status to FAILED so
    /// failures are observable through the resource itself.
    async fn record_infrastructure_error(
        &self,
        name: &str,
        detail: Option<String>,
    ) -> Result<(), OrchestrationError>;

    /// Join the queue group for `subject` (group name = subject) and feed
    /// decoded jobs to `handler` until `shutdown` fires. Each job runs on
    /// its own task, so in-flight jobs may execute concurrently.
    async fn subscribe_async_proc(
        &self,
        subject: Subject,
        handler: InfrastructureAsyncHandler,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, OrchestrationError>;

    async fn publish_message_to_queue(
        &self,
        subject: Subject,
        infra: &Infrastructure,
    ) -> Result<(), OrchestrationError>;
}

pub struct StandardInfrastructureService {
    user: User,
    infrastructures: Arc<dyn InfrastructureRepository>,
    quoins: Arc<dyn QuoinRepository>,
    bus: Arc<dyn MessageBus>,
}

impl StandardInfrastructureService {
    pub fn new(
        user: User,
        infrastructures: Arc<dyn InfrastructureRepository>,
        quoins: Arc<dyn QuoinRepository>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            user,
            infrastructures,
            quoins,
            bus,
        }
    }

    async fn readable_infrastructure(
        &self,
        name: &str,
    ) -> Result<Infrastructure, OrchestrationError> {
        self.infrastructures
            .find_by_name(name)
            .await?
            .filter(|infra| infra.authorization.authorized_read(&self.user))
            .ok_or_else(|| OrchestrationError::NotFound(format!("infrastructure {name}")))
    }

    async fn writable_infrastructure(
        &self,
        name: &str,
    ) -> Result<Infrastructure, OrchestrationError> {
        let infra = self.readable_infrastructure(name).await?;
        if !infra.authorization.authorized_write(&self.user) {
            return Err(OrchestrationError::PermissionDenied(format!(
                "user {} may not modify infrastructure {name}",
                self.user.id
            )));
        }
        Ok(infra)
    }

    /// The quoin an infrastructure may be built from: readable, VALIDATED,
    /// and carrying a resolvable archive id in its uri.
    async fn validated_quoin(&self, quoin_name: &str) -> Result<Quoin, OrchestrationError> {
        let quoin = self
            .quoins
            .find_by_name(quoin_name)
            .await?
            .filter(|quoin| quoin.authorization.authorized_read(&self.user))
            .ok_or_else(|| OrchestrationError::NotFound(format!("quoin {quoin_name}")))?;

        if quoin.status != Status::Validated {
            return Err(OrchestrationError::Validation(format!(
                "quoin {quoin_name} is {} and cannot back an infrastructure",
                quoin.status
            )));
        }
        let resolvable = quoin
            .archive_uri
            .as_deref()
            .and_then(archive_id_from_uri)
            .is_some();
        if !resolvable {
            return Err(OrchestrationError::Validation(format!(
                "quoin {quoin_name} has no resolvable archive id; upload a valid archive first"
            )));
        }
        Ok(quoin)
    }
}

#[async_trait]
impl InfrastructureService for StandardInfrastructureService {
    async fn get_infrastructure(&self, name: &str) -> Result<Infrastructure, OrchestrationError> {
        self.readable_infrastructure(name).await
    }

    async fn get_infrastructure_state(
        &self,
        name: &str,
    ) -> Result<HashMap<String, serde_json::Value>, OrchestrationError> {
        Ok(self.readable_infrastructure(name).await?.state)
    }

    async fn create_infrastructure(
        &self,
        request: CreateInfrastructureRequest,
    ) -> Result<Infrastructure, OrchestrationError> {
        if request.name.is_empty() {
            return Err(OrchestrationError::Validation(
                "infrastructure name must not be empty".to_string(),
            ));
        }

        let existing = self.infrastructures.find_by_name(&request.name).await?;
        if let Some(existing) = &existing {
            if !existing.authorization.authorized_read(&self.user) {
                return Err(OrchestrationError::NotFound(format!(
                    "infrastructure {}",
                    request.name
                )));
            }
            if !existing.authorization.authorized_write(&self.user) {
                return Err(OrchestrationError::PermissionDenied(format!(
                    "user {} may not re-create infrastructure {}",
                    self.user.id, request.name
                )));
            }
            if existing.status.blocks_recreate() {
                return Err(OrchestrationError::Conflict(format!(
                    "infrastructure {} is {} and cannot be created at this moment",
                    request.name, existing.status
                )));
            }
            info!("re-creating existing infrastructure {}", request.name);
        }

        let quoin = self.validated_quoin(&request.quoin_name).await?;

        let mut infra = Infrastructure::new(
            request.name.clone(),
            &quoin,
            request.variables,
            request.provider_slug,
            Authorization::bind_default(&self.user),
        );
        infra.status = Status::Validated;

        if existing.is_some() {
            self.infrastructures.update(&request.name, &infra).await?;
        } else {
            self.infrastructures.insert(&infra).await?;
        }
        info!("infrastructure {} stored", request.name);

        self.publish_message_to_queue(Subject::CreateInfra, &infra)
            .await?;
        Ok(infra)
    }

    async fn delete_infrastructure(&self, name: &str) -> Result<(), OrchestrationError> {
        let infra = self.writable_infrastructure(name).await?;

        if !infra.has_state() {
            return Err(OrchestrationError::Conflict(format!(
                "infrastructure {name} has no state to destroy"
            )));
        }
        if infra.status == Status::Running {
            return Err(OrchestrationError::Conflict(format!(
                "infrastructure {name} has an operation in flight"
            )));
        }

        self.infrastructures
            .update_status(name, Status::Running)
            .await?;

        // State is stripped from the published snapshot to respect queue
        // payload-size limits; the worker re-reads it over the remote
        // state backend.
        let mut snapshot = infra.without_state();
        snapshot.status = Status::Running;
        self.publish_message_to_queue(Subject::DeleteInfra, &snapshot)
            .await?;
        Ok(())
    }

    async fn update_infrastructure_state(
        &self,
        name: &str,
        state: HashMap<String, serde_json::Value>,
    ) -> Result<(), OrchestrationError> {
        self.writable_infrastructure(name).await?;
        Ok(self.infrastructures.update_state(name, &state).await?)
    }

    async fn update_infrastructure_status(
        &self,
        name: &str,
        status: Status,
    ) -> Result<(), OrchestrationError> {
        self.writable_infrastructure(name).await?;
        Ok(self.infrastructures.update_status(name, status).await?)
    }

    async fn record_infrastructure_error(
        &self,
        name: &str,
        detail: Option<String>,
    ) -> Result<(), OrchestrationError> {
        self.writable_infrastructure(name).await?;
        match detail {
            Some(message) => {
                let error = InfrastructureError::new(message);
                self.infrastructures
                    .update_error(name, Some(&error))
                    .await?;
                self.infrastructures
                    .update_status(name, Status::Failed)
                    .await?;
            }
            None => self.infrastructures.update_error(name, None).await?,
        }
        Ok(())
    }

    async fn subscribe_async_proc(
        &self,
        subject: Subject,
        handler: InfrastructureAsyncHandler,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, OrchestrationError> {
        let mut jobs = self
            .bus
            .subscribe_queue_group(subject, subject.as_str())
            .await?;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("subscription on [{}] shut down", subject);
                        break;
                    }
                    job = jobs.next() => match job {
                        Some(infra) => {
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move { handler(infra).await });
                        }
                        None => {
                            warn!("job stream on [{}] closed", subject);
                            break;
                        }
                    }
                }
            }
        });
        Ok(handle)
    }

    async fn publish_message_to_queue(
        &self,
        subject: Subject,
        infra: &Infrastructure,
    ) -> Result<(), OrchestrationError> {
        self.bus.publish(subject, infra).await?;
        info!("published infrastructure {} to queue [{}]", infra.name, subject);
        Ok(())
    }
}
