// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::authorization::Authorization;
use crate::domain::quoin::{Quoin, QuoinVar};
use crate::domain::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InfrastructureId(pub Uuid);

impl InfrastructureId {
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }
}

/// Snapshot of the Quoin an Infrastructure was built from, frozen at
/// creation time so later template edits cannot change a live environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoinRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<QuoinVar>,
}

impl From<&Quoin> for QuoinRef {
    fn from(quoin: &Quoin) -> Self {
        Self {
            name: quoin.name.clone(),
            archive_uri: quoin.archive_uri.clone(),
            variables: quoin.variables.clone(),
        }
    }
}

/// Last worker-side failure recorded on the resource, so that failures are
/// observable through the resource itself rather than lost in worker logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureError {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl InfrastructureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// A concrete environment instantiated from a Quoin.
///
/// `state` holds the provisioning tool's opaque state output and is only
/// non-empty after a successful apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Infrastructure {
    pub id: InfrastructureId,
    pub name: String,
    pub quoin: QuoinRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<QuoinVar>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InfrastructureError>,
    #[serde(default)]
    pub authorization: Authorization,
    pub provider_slug: String,
}

impl Infrastructure {
    pub fn new(
        name: impl Into<String>,
        quoin: &Quoin,
        variables: Vec<QuoinVar>,
        provider_slug: impl Into<String>,
        authorization: Authorization,
    ) -> Self {
        let name = name.into();
        Self {
            id: InfrastructureId::from_name(&name),
            name,
            quoin: QuoinRef::from(quoin),
            variables,
            state: HashMap::new(),
            status: Status::Default,
            error: None,
            authorization,
            provider_slug: provider_slug.into(),
        }
    }

    pub fn has_state(&self) -> bool {
        !self.state.is_empty()
    }

    /// Snapshot published onto the bus for a delete job: identical record
    /// with the (potentially large) state stripped to respect queue
    /// payload-size limits.
    pub fn without_state(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.state.clear();
        snapshot
    }
}
