// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

/// Bus subject a lifecycle job is published on. The queue-group name used
/// by subscribers equals the subject string, so worker replicas
/// load-balance jobs instead of each receiving every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    #[serde(rename = "create-infra")]
    CreateInfra,
    #[serde(rename = "delete-infra")]
    DeleteInfra,
}

impl Subject {
    pub fn as_str(self) -> &'static str {
        match self {
            Subject::CreateInfra => "create-infra",
            Subject::DeleteInfra => "delete-infra",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_matches_wire_name() {
        assert_eq!(Subject::CreateInfra.as_str(), "create-infra");
        assert_eq!(Subject::DeleteInfra.as_str(), "delete-infra");
        assert_eq!(
            serde_json::to_string(&Subject::CreateInfra).unwrap(),
            "\"create-infra\""
        );
    }
}
