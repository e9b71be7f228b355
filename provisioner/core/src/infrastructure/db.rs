// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that can be
//! injected into all PostgreSQL repository implementations. Constructed
//! once by the composition root and torn down with the process; no lazy
//! global session.

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the provisioner tables when they do not exist yet. Run via
    /// `aegisp db init` before the first service start.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quoins (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                archive_uri TEXT,
                variables JSONB NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                auth_policy JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quoin_archives (
                id UUID PRIMARY KEY,
                quoin_name TEXT NOT NULL,
                modules BYTEA NOT NULL,
                auth_policy JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS infrastructures (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                quoin JSONB NOT NULL,
                variables JSONB NOT NULL DEFAULT '[]',
                state JSONB NOT NULL DEFAULT '{}',
                status TEXT NOT NULL,
                error JSONB,
                auth_policy JSONB NOT NULL,
                provider_slug TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
