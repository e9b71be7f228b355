// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Quoin Application Service
//!
//! Orchestrates the Quoin/QuoinArchive half of the lifecycle:
//! - Domain layer: Quoin aggregate, Authorization checks
//! - Infrastructure layer: repositories, ProvisioningEngine (dry-run plan)
//!
//! Every operation is gated by the Authorization engine. Reads return a
//! not-found-shaped error to unauthorized callers; writes surface a
//! distinct permission error.

use crate::domain::authorization::{Authorization, User};
use crate::domain::error::OrchestrationError;
use crate::domain::provisioning::ProvisioningEngine;
use crate::domain::quoin::{ArchiveId, Quoin, QuoinArchive, QuoinVar, UPLOAD_SEGMENT};
use crate::domain::repository::{
    InfrastructureRepository, QuoinArchiveRepository, QuoinRepository,
};
use crate::domain::status::Status;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait QuoinService: Send + Sync {
    async fn get_quoin(&self, name: &str) -> Result<Quoin, OrchestrationError>;

    async fn get_quoin_archive(&self, id: ArchiveId) -> Result<QuoinArchive, OrchestrationError>;

    async fn get_quoin_archive_ids(
        &self,
        quoin_name: &str,
    ) -> Result<Vec<ArchiveId>, OrchestrationError>;

    /// Create a quoin record. Conflicts with any existing quoin unless it
    /// has been obsoleted, in which case an authorized caller re-creates
    /// it in place.
    async fn create_quoin(
        &self,
        name: String,
        variables: Vec<QuoinVar>,
    ) -> Result<Quoin, OrchestrationError>;

    /// Validate an uploaded module bundle with a dry-run plan, persist it,
    /// and link it into the parent quoin (DEFAULT → VALIDATED).
    async fn create_quoin_archive(
        &self,
        quoin_name: String,
        modules: Vec<u8>,
    ) -> Result<QuoinArchive, OrchestrationError>;

    /// Soft-delete: marks the quoin OBSOLETED. Refused while any live
    /// infrastructure still references it.
    async fn delete_quoin(&self, name: &str) -> Result<(), OrchestrationError>;
}

pub struct StandardQuoinService {
    user: User,
    quoins: Arc<dyn QuoinRepository>,
    archives: Arc<dyn QuoinArchiveRepository>,
    infrastructures: Arc<dyn InfrastructureRepository>,
    engine: Arc<dyn ProvisioningEngine>,
    /// Base URL archive uris are minted under, e.g. `http://eve:8088`.
    endpoint_base: String,
}

impl StandardQuoinService {
    pub fn new(
        user: User,
        quoins: Arc<dyn QuoinRepository>,
        archives: Arc<dyn QuoinArchiveRepository>,
        infrastructures: Arc<dyn InfrastructureRepository>,
        engine: Arc<dyn ProvisioningEngine>,
        endpoint_base: String,
    ) -> Self {
        Self {
            user,
            quoins,
            archives,
            infrastructures,
            engine,
            endpoint_base,
        }
    }

    fn archive_uri(&self, quoin_name: &str, id: ArchiveId) -> String {
        format!(
            "{}/quoin/{}{}{}",
            self.endpoint_base.trim_end_matches('/'),
            quoin_name,
            UPLOAD_SEGMENT,
            id
        )
    }

    /// Load a quoin the current user may read. Absence and denied reads
    /// are indistinguishable to the caller.
    async fn readable_quoin(&self, name: &str) -> Result<Quoin, OrchestrationError> {
        self.quoins
            .find_by_name(name)
            .await?
            .filter(|quoin| quoin.authorization.authorized_read(&self.user))
            .ok_or_else(|| OrchestrationError::NotFound(format!("quoin {name}")))
    }
}

#[async_trait]
impl QuoinService for StandardQuoinService {
    async fn get_quoin(&self, name: &str) -> Result<Quoin, OrchestrationError> {
        self.readable_quoin(name).await
    }

    async fn get_quoin_archive(&self, id: ArchiveId) -> Result<QuoinArchive, OrchestrationError> {
        self.archives
            .find_by_id(id)
            .await?
            .filter(|archive| archive.authorization.authorized_read(&self.user))
            .ok_or_else(|| OrchestrationError::NotFound(format!("quoin archive {id}")))
    }

    async fn get_quoin_archive_ids(
        &self,
        quoin_name: &str,
    ) -> Result<Vec<ArchiveId>, OrchestrationError> {
        self.readable_quoin(quoin_name).await?;
        Ok(self.archives.find_ids_by_quoin(quoin_name).await?)
    }

    async fn create_quoin(
        &self,
        name: String,
        variables: Vec<QuoinVar>,
    ) -> Result<Quoin, OrchestrationError> {
        if name.is_empty() {
            return Err(OrchestrationError::Validation(
                "quoin name must not be empty".to_string(),
            ));
        }

        match self.quoins.find_by_name(&name).await? {
            Some(existing) if existing.status != Status::Obsoleted => Err(
                OrchestrationError::Conflict(format!("quoin {name} already exists")),
            ),
            Some(existing) => {
                // Obsoleted quoins may be re-created in place by a caller
                // allowed to write the old record.
                if !existing.authorization.authorized_write(&self.user) {
                    return Err(OrchestrationError::PermissionDenied(format!(
                        "user {} may not re-create quoin {name}",
                        self.user.id
                    )));
                }
                let quoin = Quoin::new(name.clone(), variables, Authorization::bind_default(&self.user));
                self.quoins.update(&name, &quoin).await?;
                info!("quoin {} re-created", name);
                Ok(quoin)
            }
            None => {
                let quoin = Quoin::new(name.clone(), variables, Authorization::bind_default(&self.user));
                self.quoins.insert(&quoin).await?;
                info!("quoin {} created", name);
                Ok(quoin)
            }
        }
    }

    async fn create_quoin_archive(
        &self,
        quoin_name: String,
        modules: Vec<u8>,
    ) -> Result<QuoinArchive, OrchestrationError> {
        let mut quoin = self.readable_quoin(&quoin_name).await?;
        if !quoin.authorization.authorized_write(&self.user) {
            return Err(OrchestrationError::PermissionDenied(format!(
                "user {} may not upload archives for quoin {quoin_name}",
                self.user.id
            )));
        }

        // Dry-run plan before anything is persisted; an archive the CLI
        // rejects never reaches the store.
        self.engine
            .validate_modules(&quoin_name, &modules)
            .await
            .map_err(|err| {
                OrchestrationError::Validation(format!(
                    "archive for quoin {quoin_name} failed validation: {err}"
                ))
            })?;
        info!("quoin archive for {} is valid, plan generated", quoin_name);

        let archive = QuoinArchive::new(
            quoin_name.clone(),
            modules,
            Authorization::bind_default(&self.user),
        );
        self.archives.insert(&archive).await?;
        info!("quoin archive for {} stored with id {}", quoin_name, archive.id);

        quoin.link_archive(self.archive_uri(&quoin_name, archive.id));
        self.quoins.update(&quoin_name, &quoin).await?;

        Ok(archive)
    }

    async fn delete_quoin(&self, name: &str) -> Result<(), OrchestrationError> {
        let mut quoin = self.readable_quoin(name).await?;
        if !quoin.authorization.authorized_write(&self.user) {
            return Err(OrchestrationError::PermissionDenied(format!(
                "user {} may not delete quoin {name}",
                self.user.id
            )));
        }

        let references = self.infrastructures.count_live_by_quoin(name).await?;
        if references > 0 {
            return Err(OrchestrationError::Conflict(format!(
                "quoin {name} is still referenced by {references} infrastructure(s)"
            )));
        }

        if quoin.status != Status::Obsoleted {
            quoin.obsolete();
            self.quoins.update(name, &quoin).await?;
            info!("quoin {} obsoleted", name);
        }
        Ok(())
    }
}
