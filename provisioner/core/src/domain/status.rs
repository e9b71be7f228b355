// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

/// Resource lifecycle status.
///
/// Ordered lifecycle enumeration: DEFAULT → VALIDATED → RUNNING →
/// {DEPLOYED | DESTROYED | FAILED}, with OBSOLETED as the soft-delete
/// terminal for Quoins. Values are compared ordinally, never combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Default,
    Validated,
    Running,
    Deployed,
    Destroyed,
    Obsoleted,
    Failed,
}

impl Status {
    /// Statuses under which an Infrastructure refuses a create request:
    /// live, mid-flight, or soft-deleted. Everything else (DEFAULT,
    /// VALIDATED, DESTROYED, FAILED) permits an idempotent re-create.
    pub fn blocks_recreate(self) -> bool {
        matches!(self, Status::Running | Status::Deployed | Status::Obsoleted)
    }

    /// Terminal states: no further lifecycle transitions are expected.
    /// FAILED is deliberately not terminal; it is retry-eligible via a
    /// fresh create/delete request.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Destroyed | Status::Obsoleted)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Default => "DEFAULT",
            Status::Validated => "VALIDATED",
            Status::Running => "RUNNING",
            Status::Deployed => "DEPLOYED",
            Status::Destroyed => "DESTROYED",
            Status::Obsoleted => "OBSOLETED",
            Status::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recreate_is_blocked_while_live_or_in_flight() {
        assert!(Status::Running.blocks_recreate());
        assert!(Status::Deployed.blocks_recreate());
        assert!(Status::Obsoleted.blocks_recreate());

        assert!(!Status::Default.blocks_recreate());
        assert!(!Status::Validated.blocks_recreate());
        assert!(!Status::Destroyed.blocks_recreate());
        assert!(!Status::Failed.blocks_recreate());
    }

    #[test]
    fn failed_is_not_terminal() {
        assert!(Status::Destroyed.is_terminal());
        assert!(Status::Obsoleted.is_terminal());
        assert!(!Status::Failed.is_terminal());
        assert!(!Status::Running.is_terminal());
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::Validated).unwrap(),
            "\"VALIDATED\""
        );
        let parsed: Status = serde_json::from_str("\"DEPLOYED\"").unwrap();
        assert_eq!(parsed, Status::Deployed);
    }
}
