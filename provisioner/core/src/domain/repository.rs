// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root, following the Repository
//! pattern: one repository per aggregate, interface defined in the domain
//! layer, implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `QuoinRepository` | `Quoin` | `InMemoryQuoinRepository`, `PostgresQuoinRepository` |
//! | `QuoinArchiveRepository` | `QuoinArchive` | `InMemoryQuoinArchiveRepository`, `PostgresQuoinArchiveRepository` |
//! | `InfrastructureRepository` | `Infrastructure` | `InMemoryInfrastructureRepository`, `PostgresInfrastructureRepository` |
//!
//! Not-found is `Ok(None)`, never an error. Partial updates keyed by the
//! unique resource name are last-writer-wins at the store; there is no
//! optimistic-lock version field.

use crate::domain::infrastructure::{Infrastructure, InfrastructureError};
use crate::domain::quoin::{ArchiveId, Quoin, QuoinArchive};
use crate::domain::status::Status;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait QuoinRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Quoin>, RepositoryError>;

    async fn insert(&self, quoin: &Quoin) -> Result<(), RepositoryError>;

    /// Replace the record stored under `name`.
    async fn update(&self, name: &str, quoin: &Quoin) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait QuoinArchiveRepository: Send + Sync {
    async fn insert(&self, archive: &QuoinArchive) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ArchiveId) -> Result<Option<QuoinArchive>, RepositoryError>;

    /// Ids of every archive uploaded for a quoin, newest last.
    async fn find_ids_by_quoin(&self, quoin_name: &str) -> Result<Vec<ArchiveId>, RepositoryError>;
}

#[async_trait]
pub trait InfrastructureRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Infrastructure>, RepositoryError>;

    async fn insert(&self, infra: &Infrastructure) -> Result<(), RepositoryError>;

    async fn update(&self, name: &str, infra: &Infrastructure) -> Result<(), RepositoryError>;

    async fn update_state(
        &self,
        name: &str,
        state: &HashMap<String, serde_json::Value>,
    ) -> Result<(), RepositoryError>;

    async fn update_status(&self, name: &str, status: Status) -> Result<(), RepositoryError>;

    async fn update_error(
        &self,
        name: &str,
        error: Option<&InfrastructureError>,
    ) -> Result<(), RepositoryError>;

    /// Number of infrastructures still referencing `quoin_name` that have
    /// not been destroyed. A quoin can only be obsoleted at zero.
    async fn count_live_by_quoin(&self, quoin_name: &str) -> Result<u64, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
