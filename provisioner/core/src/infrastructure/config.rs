// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Environment-driven configuration
//!
//! Every knob has a working local default so a bare `aegisp` run against a
//! dev stack needs no environment at all. Lifecycle is owned by the
//! composition root: configs are read once at startup and injected into
//! the constructed services, never rebuilt lazily behind a global.

use std::path::PathBuf;

pub const DEFAULT_PORT: &str = "8088";
pub const DEFAULT_DNS: &str = "localhost";
pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_QUEUE_URL: &str = "nats://localhost:4222";
pub const DEFAULT_QUEUE_MAX_RECONNECT: u32 = 30;
pub const DEFAULT_DB_URL: &str = "postgres://localhost:5432/provisioner";
pub const DEFAULT_WORK_ROOT: &str = "/tmp/quoin";
pub const DEFAULT_PROCESS_NAME: &str = "terraform";
pub const DEFAULT_WORKSPACE_MAX_RETRY: u32 = 15;
pub const DEFAULT_STATE_BACKEND_SECRET_PATH: &str = "secret/provisioner/state-backend";
pub const DEFAULT_PROVIDER_SECRET_ROOT: &str = "secret/quoin/providers";

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Where the API server the workers call back into is reachable. Used to
/// mint archive uris and remote-state endpoints.
#[derive(Debug, Clone)]
pub struct ApiEndpointConfig {
    pub scheme: String,
    pub dns: String,
    pub port: String,
}

impl ApiEndpointConfig {
    pub fn from_env() -> Self {
        Self {
            scheme: env_or("AEGIS_SCHEME", DEFAULT_SCHEME),
            dns: env_or("AEGIS_DNS", DEFAULT_DNS),
            port: env_or("AEGIS_PORT", DEFAULT_PORT),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.dns, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub url: String,
    /// Cap on connection attempts before a publish/subscribe gives up
    /// with a bus-unavailable error.
    pub max_reconnect: u32,
}

impl BusConfig {
    pub fn from_env() -> Self {
        let max_reconnect = std::env::var("AEGIS_QUEUE_MAX_RECONNECT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_MAX_RECONNECT);
        Self {
            url: env_or("AEGIS_QUEUE_URL", DEFAULT_QUEUE_URL),
            max_reconnect,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_or("AEGIS_DB_URL", DEFAULT_DB_URL),
        }
    }
}

/// Provisioning engine knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shared temp root all job workspaces are allocated under.
    pub work_root: PathBuf,
    /// Provisioning CLI executable name.
    pub process_name: String,
    /// Workspace naming collision retry ceiling.
    pub workspace_max_retry: u32,
    /// Secret path of the remote state backend's basic-auth record.
    pub state_backend_secret_path: String,
    /// Secret root provider credentials hang off, completed as
    /// `<root>/<provider>/credentials`.
    pub provider_secret_root: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            work_root: PathBuf::from(env_or("AEGIS_WORK_DIR", DEFAULT_WORK_ROOT)),
            process_name: env_or("AEGIS_PROVISIONER_BIN", DEFAULT_PROCESS_NAME),
            workspace_max_retry: DEFAULT_WORKSPACE_MAX_RETRY,
            state_backend_secret_path: env_or(
                "AEGIS_STATE_BACKEND_SECRET",
                DEFAULT_STATE_BACKEND_SECRET_PATH,
            ),
            provider_secret_root: env_or(
                "AEGIS_PROVIDER_SECRET_ROOT",
                DEFAULT_PROVIDER_SECRET_ROOT,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_base_url() {
        let endpoint = ApiEndpointConfig {
            scheme: "http".into(),
            dns: "eve".into(),
            port: "8088".into(),
        };
        assert_eq!(endpoint.base_url(), "http://eve:8088");
    }
}
