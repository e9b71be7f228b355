// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::authorization::Authorization;
use crate::domain::status::Status;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Path segment separating a Quoin's upload endpoint from the archive id
/// in its `archiveUri`.
pub const UPLOAD_SEGMENT: &str = "/upload/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoinId(pub Uuid);

impl QuoinId {
    /// Quoin ids are derived deterministically from the unique name, so
    /// re-creating a quoin under the same name yields the same id.
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveId(pub Uuid);

impl ArchiveId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ArchiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A key/value input variable declared on a Quoin or overridden per
/// Infrastructure. Order is preserved into the rendered var file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoinVar {
    pub key: String,
    pub value: String,
}

impl QuoinVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A named, versioned deployment template.
///
/// `archive_uri` is only meaningful once a QuoinArchive has been validated
/// and linked; until then the quoin stays at DEFAULT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quoin {
    pub id: QuoinId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<QuoinVar>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub authorization: Authorization,
}

impl Quoin {
    pub fn new(name: impl Into<String>, variables: Vec<QuoinVar>, authorization: Authorization) -> Self {
        let name = name.into();
        Self {
            id: QuoinId::from_name(&name),
            name,
            archive_uri: None,
            variables,
            status: Status::Default,
            authorization,
        }
    }

    /// Link a validated archive and promote the quoin to VALIDATED.
    pub fn link_archive(&mut self, archive_uri: String) {
        self.archive_uri = Some(archive_uri);
        self.status = Status::Validated;
    }

    pub fn obsolete(&mut self) {
        self.status = Status::Obsoleted;
    }
}

/// An immutable uploaded bundle of provisioning modules (tar+gzip), tied
/// to exactly one Quoin. Created once per upload, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoinArchive {
    pub id: ArchiveId,
    pub quoin_name: String,
    pub modules: Vec<u8>,
    #[serde(default)]
    pub authorization: Authorization,
}

impl QuoinArchive {
    pub fn new(quoin_name: impl Into<String>, modules: Vec<u8>, authorization: Authorization) -> Self {
        Self {
            id: ArchiveId::new(),
            quoin_name: quoin_name.into(),
            modules,
            authorization,
        }
    }
}

/// Extract the archive id suffix from an `archiveUri` of the form
/// `scheme://host:port/quoin/<name>/upload/<id>`. Returns `None` when the
/// uri has no upload segment or an empty suffix.
pub fn archive_id_from_uri(archive_uri: &str) -> Option<&str> {
    match archive_uri.split_once(UPLOAD_SEGMENT) {
        Some((_, id)) if !id.is_empty() => Some(id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoin_id_is_deterministic_over_name() {
        assert_eq!(QuoinId::from_name("vpc-basic"), QuoinId::from_name("vpc-basic"));
        assert_ne!(QuoinId::from_name("vpc-basic"), QuoinId::from_name("vpc-other"));
    }

    #[test]
    fn archive_id_parses_from_uri_suffix() {
        let id = ArchiveId::new();
        let uri = format!("http://localhost:8088/quoin/vpc-basic/upload/{id}");
        assert_eq!(archive_id_from_uri(&uri), Some(id.to_string().as_str()));
    }

    #[test]
    fn archive_id_absent_when_uri_has_no_upload_segment() {
        assert_eq!(archive_id_from_uri("http://localhost:8088/quoin/vpc-basic"), None);
        assert_eq!(archive_id_from_uri("http://localhost:8088/quoin/vpc-basic/upload/"), None);
    }

    #[test]
    fn link_archive_promotes_to_validated() {
        let mut quoin = Quoin::new("vpc-basic", vec![], Authorization::default());
        assert_eq!(quoin.status, Status::Default);

        quoin.link_archive("http://localhost:8088/quoin/vpc-basic/upload/abc".into());
        assert_eq!(quoin.status, Status::Validated);
        assert!(quoin.archive_uri.is_some());
    }
}
