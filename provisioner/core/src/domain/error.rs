// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::bus::BusError;
use crate::domain::provisioning::ProvisioningError;
use crate::domain::repository::RepositoryError;
use crate::domain::secrets::SecretError;

/// Error taxonomy surfaced by the orchestration services.
///
/// `NotFound` deliberately covers both "resource absent" and "read access
/// denied" so unauthorized callers cannot probe for resource existence.
/// Write and execute denials are surfaced distinctly as
/// `PermissionDenied`. Authorization and validation errors are produced
/// before any persistence or bus side effect occurs.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Store(#[from] RepositoryError),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

impl OrchestrationError {
    /// HTTP status the API layer maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            OrchestrationError::NotFound(_) => 404,
            OrchestrationError::PermissionDenied(_) => 403,
            OrchestrationError::Validation(_) => 400,
            OrchestrationError::Conflict(_) => 409,
            OrchestrationError::Provisioning(_)
            | OrchestrationError::Bus(_)
            | OrchestrationError::Store(_)
            | OrchestrationError::Secret(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_mapping() {
        assert_eq!(OrchestrationError::NotFound("quoin x".into()).http_status(), 404);
        assert_eq!(
            OrchestrationError::PermissionDenied("write".into()).http_status(),
            403
        );
        assert_eq!(OrchestrationError::Validation("bad".into()).http_status(), 400);
        assert_eq!(OrchestrationError::Conflict("busy".into()).http_status(), 409);
        assert_eq!(
            OrchestrationError::Store(RepositoryError::Database("down".into())).http_status(),
            500
        );
        assert_eq!(
            OrchestrationError::Bus(BusError::Unavailable {
                attempts: 30,
                reason: "no servers".into()
            })
            .http_status(),
            500
        );
    }
}
