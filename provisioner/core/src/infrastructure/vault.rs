// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Vault Secret Provider
//!
//! `SecretProvider` implementation over the Vault KV store. Addressed with
//! full logical paths (`secret/quoin/providers/aws/credentials`); the
//! first segment is the mount. Client settings come from the standard
//! `VAULT_ADDR`/`VAULT_TOKEN` environment.

use crate::domain::secrets::{SecretError, SecretProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv1;

pub const DEFAULT_VAULT_ADDR: &str = "https://127.0.0.1:8200";

pub struct VaultSecretProvider {
    client: VaultClient,
}

impl VaultSecretProvider {
    pub fn from_env() -> Result<Self, SecretError> {
        let address =
            std::env::var("VAULT_ADDR").unwrap_or_else(|_| DEFAULT_VAULT_ADDR.to_string());
        let token = std::env::var("VAULT_TOKEN").unwrap_or_default();

        let settings = VaultClientSettingsBuilder::default()
            .address(address)
            .token(token)
            .build()
            .map_err(|err| SecretError::Client(err.to_string()))?;
        let client =
            VaultClient::new(settings).map_err(|err| SecretError::Client(err.to_string()))?;
        Ok(Self { client })
    }

    fn split_path(path: &str) -> Result<(&str, &str), SecretError> {
        match path.split_once('/') {
            Some((mount, rest)) if !mount.is_empty() && !rest.is_empty() => Ok((mount, rest)),
            _ => Err(SecretError::Client(format!(
                "secret path {path} must be <mount>/<path>"
            ))),
        }
    }
}

#[async_trait]
impl SecretProvider for VaultSecretProvider {
    async fn get_secret(
        &self,
        path: &str,
    ) -> Result<HashMap<String, serde_json::Value>, SecretError> {
        let (mount, rest) = Self::split_path(path)?;
        let data: HashMap<String, serde_json::Value> = kv1::get(&self.client, mount, rest)
            .await
            .map_err(|err| match err {
                ClientError::APIError { code: 404, .. } => {
                    SecretError::NotFound(path.to_string())
                }
                other => SecretError::Client(other.to_string()),
            })?;

        if data.is_empty() {
            return Err(SecretError::NotFound(path.to_string()));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_splits_into_mount_and_rest() {
        assert_eq!(
            VaultSecretProvider::split_path("secret/quoin/providers/aws/credentials").unwrap(),
            ("secret", "quoin/providers/aws/credentials")
        );
        assert!(VaultSecretProvider::split_path("secret").is_err());
        assert!(VaultSecretProvider::split_path("/x").is_err());
    }
}
