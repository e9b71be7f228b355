// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provisioning Engine Port
//!
//! Contract for executing the external provisioning CLI against a module
//! archive and variable set. The production implementation
//! (`crate::infrastructure::terraform`) shells out to the CLI inside an
//! isolated per-job workspace; tests substitute scripted fakes.

use crate::domain::quoin::QuoinVar;
use crate::domain::secrets::SecretError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Everything a worker hands the engine for one apply/destroy run.
#[derive(Debug, Clone)]
pub struct ProvisionJob {
    /// Infrastructure name; seeds the workspace directory name.
    pub name: String,
    /// gzip+tar bundle of provisioning modules.
    pub modules: Vec<u8>,
    /// Rendered variable file, absent when no variables were supplied.
    pub var_file: Option<Vec<u8>>,
    /// HTTP state endpoint the CLI reads/writes its state blob through.
    pub remote_state_url: String,
    /// Target cloud account/credential scope, `<provider>:<schema>`.
    pub provider_slug: String,
}

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Dry-run plan against an uploaded module bundle, used to validate a
    /// QuoinArchive before it is persisted and linked.
    async fn validate_modules(
        &self,
        quoin_name: &str,
        modules: &[u8],
    ) -> Result<(), ProvisioningError>;

    async fn apply(&self, job: &ProvisionJob) -> Result<(), ProvisioningError>;

    async fn destroy(&self, job: &ProvisionJob) -> Result<(), ProvisioningError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// Fatal: workspace naming collided past the retry ceiling. Allocation
    /// must never silently reuse another job's directory.
    #[error("workspace allocation under {root} failed after {attempts} attempts")]
    WorkspaceAllocation { root: PathBuf, attempts: u32 },

    #[error("archive unpack failed: {0}")]
    Archive(String),

    #[error("{action} exited with error: {stderr}")]
    Execution { action: String, stderr: String },

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Render ordered variables as `key="value"` lines for the CLI's var file.
/// Returns `None` when no variables are supplied so callers can skip the
/// file entirely. Backslashes, quotes and newlines inside values are
/// escaped to keep each assignment on a single well-formed line.
pub fn render_var_file(variables: &[QuoinVar]) -> Option<Vec<u8>> {
    if variables.is_empty() {
        return None;
    }
    let mut out = String::new();
    for var in variables {
        out.push_str(&var.key);
        out.push_str("=\"");
        out.push_str(&escape_value(&var.value));
        out.push_str("\"\n");
    }
    Some(out.into_bytes())
}

fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_ordered_assignments() {
        let vars = vec![
            QuoinVar::new("region", "us-west-2"),
            QuoinVar::new("instance_type", "t2.micro"),
        ];
        let rendered = String::from_utf8(render_var_file(&vars).unwrap()).unwrap();
        assert_eq!(
            rendered,
            "region=\"us-west-2\"\ninstance_type=\"t2.micro\"\n"
        );
    }

    #[test]
    fn omitted_when_no_variables() {
        assert!(render_var_file(&[]).is_none());
    }

    #[test]
    fn escapes_quotes_backslashes_and_newlines() {
        let vars = vec![QuoinVar::new("motd", "say \"hi\"\nc:\\path")];
        let rendered = String::from_utf8(render_var_file(&vars).unwrap()).unwrap();
        assert_eq!(rendered, "motd=\"say \\\"hi\\\"\\nc:\\\\path\"\n");
        assert_eq!(rendered.lines().count(), 1);
    }
}
