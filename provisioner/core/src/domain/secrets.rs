// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::collections::HashMap;

/// Secret store contract, used for cloud credentials and the remote state
/// backend's basic-auth record. Absence of a secret at a path is an error,
/// not an empty map.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(
        &self,
        path: &str,
    ) -> Result<HashMap<String, serde_json::Value>, SecretError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("no secret found at {0}")]
    NotFound(String),

    #[error("secret at {path} is missing key {key}")]
    MissingKey { path: String, key: String },

    #[error("secret store error: {0}")]
    Client(String),
}

/// Pull a required string value out of a secret payload.
pub fn require_str(
    data: &HashMap<String, serde_json::Value>,
    path: &str,
    key: &str,
) -> Result<String, SecretError> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SecretError::MissingKey {
            path: path.to_string(),
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_errors_on_missing_or_non_string() {
        let mut data = HashMap::new();
        data.insert("user".to_string(), serde_json::json!("svc"));
        data.insert("count".to_string(), serde_json::json!(3));

        assert_eq!(require_str(&data, "secret/x", "user").unwrap(), "svc");
        assert!(matches!(
            require_str(&data, "secret/x", "password"),
            Err(SecretError::MissingKey { .. })
        ));
        assert!(matches!(
            require_str(&data, "secret/x", "count"),
            Err(SecretError::MissingKey { .. })
        ));
    }
}
