// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::BitOr;

/// Identity of the async worker agent. Authorized for every operation on
/// every resource so that workers can update status/state without
/// per-resource grants.
pub const AGENT_USER: &str = "terraform";

/// Group name granted to unauthenticated callers.
pub const PUBLIC_GROUP: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A group a resource policy can be granted to: a team, an organization,
/// or the distinguished "public" group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Group(pub String);

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn public() -> Self {
        Self(PUBLIC_GROUP.to_string())
    }
}

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub organization: Group,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<Group>,
}

impl User {
    pub fn new(id: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            organization: Group::new(organization),
            teams: Vec::new(),
        }
    }

    /// The system identity the async workers run under.
    pub fn agent() -> Self {
        Self {
            id: UserId::new(AGENT_USER),
            organization: Group::new(AGENT_USER),
            teams: vec![Group::new(AGENT_USER)],
        }
    }

    pub fn is_agent(&self) -> bool {
        self.id.0 == AGENT_USER
    }
}

/// Per-group permission on a resource, a bitmask of read/write/execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyMode(pub u8);

impl PolicyMode {
    pub const NONE: PolicyMode = PolicyMode(0);
    pub const READ: PolicyMode = PolicyMode(1 << 1);
    pub const WRITE: PolicyMode = PolicyMode(1 << 2);
    pub const EXECUTE: PolicyMode = PolicyMode(1 << 3);
    pub const READ_WRITE: PolicyMode = PolicyMode(Self::READ.0 | Self::WRITE.0);
    pub const READ_EXECUTE: PolicyMode = PolicyMode(Self::READ.0 | Self::EXECUTE.0);
    pub const WRITE_EXECUTE: PolicyMode = PolicyMode(Self::WRITE.0 | Self::EXECUTE.0);
    pub const ALL: PolicyMode = PolicyMode(Self::READ.0 | Self::WRITE.0 | Self::EXECUTE.0);

    /// True when every flag in `mode` is present in `self`.
    pub fn permits(self, mode: PolicyMode) -> bool {
        self.0 & mode.0 == mode.0
    }
}

impl BitOr for PolicyMode {
    type Output = PolicyMode;

    fn bitor(self, rhs: PolicyMode) -> PolicyMode {
        PolicyMode(self.0 | rhs.0)
    }
}

/// Ownership and group policy attached to every resource.
///
/// The effective check is owner-only: group grants are recorded so that the
/// policy surface can widen later, but the default policy consults only the
/// owner and the agent identity. Checks never fail; callers convert `false`
/// into the caller-visible error for their path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub owner: UserId,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub group_access: HashMap<Group, PolicyMode>,
}

impl Authorization {
    /// Default policy bound at resource creation: owner gets ALL, the
    /// owner's organization gets READ, "public" gets NONE.
    ///
    /// Always built from the request's authenticated user. Client-supplied
    /// authorization blobs are never merged in.
    pub fn bind_default(user: &User) -> Self {
        let mut group_access = HashMap::new();
        group_access.insert(user.organization.clone(), PolicyMode::READ);
        group_access.insert(Group::public(), PolicyMode::NONE);
        Self {
            owner: user.id.clone(),
            group_access,
        }
    }

    pub fn authorized_read(&self, user: &User) -> bool {
        user.is_agent() || self.owner == user.id
    }

    pub fn authorized_write(&self, user: &User) -> bool {
        user.is_agent() || self.owner == user.id
    }

    pub fn authorized_execute(&self, user: &User) -> bool {
        user.is_agent() || self.owner == user.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_user_is_authorized_for_everything() {
        let auth = Authorization::bind_default(&User::new("alice", "platform"));
        let agent = User::agent();

        assert!(auth.authorized_read(&agent));
        assert!(auth.authorized_write(&agent));
        assert!(auth.authorized_execute(&agent));
    }

    #[test]
    fn owner_is_authorized() {
        let alice = User::new("alice", "platform");
        let auth = Authorization::bind_default(&alice);

        assert!(auth.authorized_read(&alice));
        assert!(auth.authorized_write(&alice));
        assert!(auth.authorized_execute(&alice));
    }

    #[test]
    fn non_owner_is_denied_everything() {
        let auth = Authorization::bind_default(&User::new("alice", "platform"));
        let mallory = User::new("mallory", "platform");

        assert!(!auth.authorized_read(&mallory));
        assert!(!auth.authorized_write(&mallory));
        assert!(!auth.authorized_execute(&mallory));
    }

    #[test]
    fn bind_default_seeds_organization_and_public() {
        let alice = User::new("alice", "platform");
        let auth = Authorization::bind_default(&alice);

        assert_eq!(auth.owner, alice.id);
        assert_eq!(
            auth.group_access.get(&Group::new("platform")),
            Some(&PolicyMode::READ)
        );
        assert_eq!(auth.group_access.get(&Group::public()), Some(&PolicyMode::NONE));
    }

    #[test]
    fn policy_mode_composes_by_or() {
        assert_eq!(PolicyMode::READ | PolicyMode::WRITE, PolicyMode::READ_WRITE);
        assert!(PolicyMode::ALL.permits(PolicyMode::READ));
        assert!(PolicyMode::ALL.permits(PolicyMode::WRITE_EXECUTE));
        assert!(!PolicyMode::READ.permits(PolicyMode::WRITE));
        assert!(PolicyMode::NONE.permits(PolicyMode::NONE));
    }
}
