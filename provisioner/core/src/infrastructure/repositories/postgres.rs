// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Repositories
//!
//! Production repository implementations backed by the `quoins`,
//! `quoin_archives` and `infrastructures` tables via `sqlx`. Rich fields
//! (variables, authorization, quoin snapshot, state, error) round-trip as
//! JSONB; status is stored as its wire string. Partial updates are keyed
//! by the unique resource name and are last-writer-wins.

use crate::domain::authorization::Authorization;
use crate::domain::infrastructure::{
    Infrastructure, InfrastructureError, InfrastructureId, QuoinRef,
};
use crate::domain::quoin::{ArchiveId, Quoin, QuoinArchive, QuoinId, QuoinVar};
use crate::domain::repository::{
    InfrastructureRepository, QuoinArchiveRepository, QuoinRepository, RepositoryError,
};
use crate::domain::status::Status;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::HashMap;

fn status_to_str(status: Status) -> &'static str {
    match status {
        Status::Default => "DEFAULT",
        Status::Validated => "VALIDATED",
        Status::Running => "RUNNING",
        Status::Deployed => "DEPLOYED",
        Status::Destroyed => "DESTROYED",
        Status::Obsoleted => "OBSOLETED",
        Status::Failed => "FAILED",
    }
}

fn status_from_str(raw: &str) -> Result<Status, RepositoryError> {
    match raw {
        "DEFAULT" => Ok(Status::Default),
        "VALIDATED" => Ok(Status::Validated),
        "RUNNING" => Ok(Status::Running),
        "DEPLOYED" => Ok(Status::Deployed),
        "DESTROYED" => Ok(Status::Destroyed),
        "OBSOLETED" => Ok(Status::Obsoleted),
        "FAILED" => Ok(Status::Failed),
        other => Err(RepositoryError::Serialization(format!(
            "unknown status {other}"
        ))),
    }
}

pub struct PostgresQuoinRepository {
    pool: PgPool,
}

impl PostgresQuoinRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Quoin, RepositoryError> {
        let variables: serde_json::Value = row.get("variables");
        let auth: serde_json::Value = row.get("auth_policy");
        let status: String = row.get("status");
        Ok(Quoin {
            id: QuoinId(row.get("id")),
            name: row.get("name"),
            archive_uri: row.get("archive_uri"),
            variables: serde_json::from_value::<Vec<QuoinVar>>(variables)?,
            status: status_from_str(&status)?,
            authorization: serde_json::from_value::<Authorization>(auth)?,
        })
    }
}

#[async_trait]
impl QuoinRepository for PostgresQuoinRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Quoin>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, archive_uri, variables, status, auth_policy FROM quoins WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn insert(&self, quoin: &Quoin) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO quoins (id, name, archive_uri, variables, status, auth_policy)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(quoin.id.0)
        .bind(&quoin.name)
        .bind(&quoin.archive_uri)
        .bind(serde_json::to_value(&quoin.variables)?)
        .bind(status_to_str(quoin.status))
        .bind(serde_json::to_value(&quoin.authorization)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, name: &str, quoin: &Quoin) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE quoins
            SET id = $2, archive_uri = $3, variables = $4, status = $5, auth_policy = $6
            WHERE name = $1
            "#,
        )
        .bind(name)
        .bind(quoin.id.0)
        .bind(&quoin.archive_uri)
        .bind(serde_json::to_value(&quoin.variables)?)
        .bind(status_to_str(quoin.status))
        .bind(serde_json::to_value(&quoin.authorization)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("quoin {name}")));
        }
        Ok(())
    }
}

pub struct PostgresQuoinArchiveRepository {
    pool: PgPool,
}

impl PostgresQuoinArchiveRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuoinArchiveRepository for PostgresQuoinArchiveRepository {
    async fn insert(&self, archive: &QuoinArchive) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO quoin_archives (id, quoin_name, modules, auth_policy)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(archive.id.0)
        .bind(&archive.quoin_name)
        .bind(&archive.modules)
        .bind(serde_json::to_value(&archive.authorization)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: ArchiveId) -> Result<Option<QuoinArchive>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, quoin_name, modules, auth_policy FROM quoin_archives WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let auth: serde_json::Value = row.get("auth_policy");
                Ok(Some(QuoinArchive {
                    id: ArchiveId(row.get("id")),
                    quoin_name: row.get("quoin_name"),
                    modules: row.get("modules"),
                    authorization: serde_json::from_value::<Authorization>(auth)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn find_ids_by_quoin(
        &self,
        quoin_name: &str,
    ) -> Result<Vec<ArchiveId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM quoin_archives WHERE quoin_name = $1")
            .bind(quoin_name)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| ArchiveId(row.get("id"))).collect())
    }
}

pub struct PostgresInfrastructureRepository {
    pool: PgPool,
}

impl PostgresInfrastructureRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Infrastructure, RepositoryError> {
        let quoin: serde_json::Value = row.get("quoin");
        let variables: serde_json::Value = row.get("variables");
        let state: serde_json::Value = row.get("state");
        let error: Option<serde_json::Value> = row.get("error");
        let auth: serde_json::Value = row.get("auth_policy");
        let status: String = row.get("status");

        Ok(Infrastructure {
            id: InfrastructureId(row.get("id")),
            name: row.get("name"),
            quoin: serde_json::from_value::<QuoinRef>(quoin)?,
            variables: serde_json::from_value::<Vec<QuoinVar>>(variables)?,
            state: serde_json::from_value::<HashMap<String, serde_json::Value>>(state)?,
            status: status_from_str(&status)?,
            error: error
                .map(serde_json::from_value::<InfrastructureError>)
                .transpose()?,
            authorization: serde_json::from_value::<Authorization>(auth)?,
            provider_slug: row.get("provider_slug"),
        })
    }

    async fn touch(&self, name: &str, result: sqlx::postgres::PgQueryResult) -> Result<(), RepositoryError> {
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("infrastructure {name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl InfrastructureRepository for PostgresInfrastructureRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Infrastructure>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, quoin, variables, state, status, error, auth_policy, provider_slug
            FROM infrastructures WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn insert(&self, infra: &Infrastructure) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO infrastructures
                (id, name, quoin, variables, state, status, error, auth_policy, provider_slug)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(infra.id.0)
        .bind(&infra.name)
        .bind(serde_json::to_value(&infra.quoin)?)
        .bind(serde_json::to_value(&infra.variables)?)
        .bind(serde_json::to_value(&infra.state)?)
        .bind(status_to_str(infra.status))
        .bind(infra.error.as_ref().map(serde_json::to_value).transpose()?)
        .bind(serde_json::to_value(&infra.authorization)?)
        .bind(&infra.provider_slug)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, name: &str, infra: &Infrastructure) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE infrastructures
            SET id = $2, quoin = $3, variables = $4, state = $5, status = $6,
                error = $7, auth_policy = $8, provider_slug = $9
            WHERE name = $1
            "#,
        )
        .bind(name)
        .bind(infra.id.0)
        .bind(serde_json::to_value(&infra.quoin)?)
        .bind(serde_json::to_value(&infra.variables)?)
        .bind(serde_json::to_value(&infra.state)?)
        .bind(status_to_str(infra.status))
        .bind(infra.error.as_ref().map(serde_json::to_value).transpose()?)
        .bind(serde_json::to_value(&infra.authorization)?)
        .bind(&infra.provider_slug)
        .execute(&self.pool)
        .await?;

        self.touch(name, result).await
    }

    async fn update_state(
        &self,
        name: &str,
        state: &HashMap<String, serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE infrastructures SET state = $2 WHERE name = $1")
            .bind(name)
            .bind(serde_json::to_value(state)?)
            .execute(&self.pool)
            .await?;
        self.touch(name, result).await
    }

    async fn update_status(&self, name: &str, status: Status) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE infrastructures SET status = $2 WHERE name = $1")
            .bind(name)
            .bind(status_to_str(status))
            .execute(&self.pool)
            .await?;
        self.touch(name, result).await
    }

    async fn update_error(
        &self,
        name: &str,
        error: Option<&InfrastructureError>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE infrastructures SET error = $2 WHERE name = $1")
            .bind(name)
            .bind(error.map(serde_json::to_value).transpose()?)
            .execute(&self.pool)
            .await?;
        self.touch(name, result).await
    }

    async fn count_live_by_quoin(&self, quoin_name: &str) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS live FROM infrastructures
            WHERE quoin->>'name' = $1 AND status <> 'DESTROYED'
            "#,
        )
        .bind(quoin_name)
        .fetch_one(&self.pool)
        .await?;

        let live: i64 = row.get("live");
        Ok(live as u64)
    }
}
