// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory repository implementations for development and testing.
//! Production deployments use the PostgreSQL implementations in
//! [`postgres`].

pub mod postgres;

use crate::domain::infrastructure::{Infrastructure, InfrastructureError};
use crate::domain::quoin::{ArchiveId, Quoin, QuoinArchive};
use crate::domain::repository::{
    InfrastructureRepository, QuoinArchiveRepository, QuoinRepository, RepositoryError,
};
use crate::domain::status::Status;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct InMemoryQuoinRepository {
    quoins: Arc<Mutex<HashMap<String, Quoin>>>,
}

impl InMemoryQuoinRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoinRepository for InMemoryQuoinRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Quoin>, RepositoryError> {
        let quoins = self.quoins.lock().unwrap_or_else(|e| e.into_inner());
        Ok(quoins.get(name).cloned())
    }

    async fn insert(&self, quoin: &Quoin) -> Result<(), RepositoryError> {
        let mut quoins = self.quoins.lock().unwrap_or_else(|e| e.into_inner());
        quoins.insert(quoin.name.clone(), quoin.clone());
        Ok(())
    }

    async fn update(&self, name: &str, quoin: &Quoin) -> Result<(), RepositoryError> {
        let mut quoins = self.quoins.lock().unwrap_or_else(|e| e.into_inner());
        if !quoins.contains_key(name) {
            return Err(RepositoryError::NotFound(format!("quoin {name}")));
        }
        quoins.insert(name.to_string(), quoin.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryQuoinArchiveRepository {
    archives: Arc<Mutex<Vec<QuoinArchive>>>,
}

impl InMemoryQuoinArchiveRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoinArchiveRepository for InMemoryQuoinArchiveRepository {
    async fn insert(&self, archive: &QuoinArchive) -> Result<(), RepositoryError> {
        let mut archives = self.archives.lock().unwrap_or_else(|e| e.into_inner());
        archives.push(archive.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ArchiveId) -> Result<Option<QuoinArchive>, RepositoryError> {
        let archives = self.archives.lock().unwrap_or_else(|e| e.into_inner());
        Ok(archives.iter().find(|archive| archive.id == id).cloned())
    }

    async fn find_ids_by_quoin(
        &self,
        quoin_name: &str,
    ) -> Result<Vec<ArchiveId>, RepositoryError> {
        let archives = self.archives.lock().unwrap_or_else(|e| e.into_inner());
        Ok(archives
            .iter()
            .filter(|archive| archive.quoin_name == quoin_name)
            .map(|archive| archive.id)
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryInfrastructureRepository {
    infrastructures: Arc<Mutex<HashMap<String, Infrastructure>>>,
}

impl InMemoryInfrastructureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        name: &str,
        apply: impl FnOnce(&mut Infrastructure) -> T,
    ) -> Result<T, RepositoryError> {
        let mut infrastructures = self
            .infrastructures
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match infrastructures.get_mut(name) {
            Some(infra) => Ok(apply(infra)),
            None => Err(RepositoryError::NotFound(format!("infrastructure {name}"))),
        }
    }
}

#[async_trait]
impl InfrastructureRepository for InMemoryInfrastructureRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Infrastructure>, RepositoryError> {
        let infrastructures = self
            .infrastructures
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Ok(infrastructures.get(name).cloned())
    }

    async fn insert(&self, infra: &Infrastructure) -> Result<(), RepositoryError> {
        let mut infrastructures = self
            .infrastructures
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        infrastructures.insert(infra.name.clone(), infra.clone());
        Ok(())
    }

    async fn update(&self, name: &str, infra: &Infrastructure) -> Result<(), RepositoryError> {
        self.with_entry(name, |entry| *entry = infra.clone())
    }

    async fn update_state(
        &self,
        name: &str,
        state: &HashMap<String, serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        self.with_entry(name, |entry| entry.state = state.clone())
    }

    async fn update_status(&self, name: &str, status: Status) -> Result<(), RepositoryError> {
        self.with_entry(name, |entry| entry.status = status)
    }

    async fn update_error(
        &self,
        name: &str,
        error: Option<&InfrastructureError>,
    ) -> Result<(), RepositoryError> {
        self.with_entry(name, |entry| entry.error = error.cloned())
    }

    async fn count_live_by_quoin(&self, quoin_name: &str) -> Result<u64, RepositoryError> {
        let infrastructures = self
            .infrastructures
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Ok(infrastructures
            .values()
            .filter(|infra| infra.quoin.name == quoin_name && infra.status != Status::Destroyed)
            .count() as u64)
    }
}
