// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terraform Execution Engine
//!
//! Production `ProvisioningEngine`: isolates a per-job workspace under the
//! shared temp root, unpacks the module archive into it, materializes the
//! variable file, wires the HTTP remote state backend, and shells out to
//! the CLI for plan/apply/destroy.
//!
//! Isolation invariant: the workspace directory name is claimed with an
//! atomic create, so two concurrent jobs can never run inside the same
//! directory even when they share a job name. Cloud credentials are only
//! ever injected as process environment, never written into the
//! workspace. The workspace is removed on every exit path.

use crate::domain::provisioning::{ProvisionJob, ProvisioningEngine, ProvisioningError};
use crate::domain::secrets::{require_str, SecretProvider};
use crate::infrastructure::config::EngineConfig;
use async_trait::async_trait;
use chrono::Utc;
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_STATE_FILE: &str = "terraform.tfstate";
/// Var file shipped inside a module bundle, consumed by `plan`.
pub const MODULE_VAR_FILE: &str = "terraform.tfvars";
/// Var file rendered from an infrastructure's variables for apply/destroy.
pub const CUSTOM_VAR_FILE: &str = "varfile";

#[derive(Clone, Copy)]
enum LifecycleAction {
    Apply,
    Destroy,
}

impl LifecycleAction {
    fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::Apply => "apply",
            LifecycleAction::Destroy => "destroy",
        }
    }
}

/// Claim an isolated directory under `root` for one job.
///
/// The directory name hashes `job_name` plus the current unix time under a
/// random namespace. A collision waits one second and retries with the
/// attempt counter appended to the job name; exhausting `max_retry`
/// attempts is a fatal allocation error rather than a silent reuse of
/// another job's directory.
pub async fn allocate_workspace(
    root: &Path,
    job_name: &str,
    max_retry: u32,
) -> Result<PathBuf, ProvisioningError> {
    std::fs::create_dir_all(root)?;

    let mut attempt: u32 = 0;
    let mut name = job_name.to_string();
    loop {
        let path_base = format!("{}{}", name, Utc::now().timestamp());
        let dir = root.join(Uuid::new_v5(&Uuid::new_v4(), path_base.as_bytes()).to_string());
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                attempt += 1;
                if attempt > max_retry {
                    return Err(ProvisioningError::WorkspaceAllocation {
                        root: root.to_path_buf(),
                        attempts: attempt,
                    });
                }
                warn!(
                    "workspace {} already exists, retry {}/{}",
                    dir.display(),
                    attempt,
                    max_retry
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
                name = format!("{job_name}-{attempt}");
            }
            Err(err) => return Err(ProvisioningError::Io(err)),
        }
    }
}

/// Stream a gzip+tar archive into the workspace, preserving directory
/// structure and file modes. Any entry error aborts; the caller discards
/// the workspace, so no partial state escapes.
pub fn unpack_archive(workspace: &Path, tar_gz: &[u8]) -> Result<(), ProvisioningError> {
    let decoder = GzDecoder::new(tar_gz);
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);

    let entries = archive
        .entries()
        .map_err(|err| ProvisioningError::Archive(err.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| ProvisioningError::Archive(err.to_string()))?;
        let path = entry
            .path()
            .map_err(|err| ProvisioningError::Archive(err.to_string()))?
            .into_owned();
        let unpacked = entry
            .unpack_in(workspace)
            .map_err(|err| ProvisioningError::Archive(err.to_string()))?;
        if !unpacked {
            return Err(ProvisioningError::Archive(format!(
                "entry {} escapes the workspace",
                path.display()
            )));
        }
        debug!("unpacked {} into {}", path.display(), workspace.display());
    }
    Ok(())
}

pub struct TerraformEngine {
    config: EngineConfig,
    secrets: Arc<dyn SecretProvider>,
}

impl TerraformEngine {
    pub fn new(config: EngineConfig, secrets: Arc<dyn SecretProvider>) -> Self {
        Self { config, secrets }
    }

    async fn run(
        &self,
        workspace: &Path,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<(), ProvisioningError> {
        debug!("{} {}", self.config.process_name, args.join(" "));
        let output = Command::new(&self.config.process_name)
            .args(args)
            .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .current_dir(workspace)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProvisioningError::Execution {
                action: args.first().cloned().unwrap_or_default(),
                stderr,
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{}", stdout.trim());
        }
        Ok(())
    }

    /// Point the CLI's state at the infrastructure's HTTP state endpoint,
    /// with the backend's basic-auth record resolved from the secret
    /// store.
    async fn configure_remote_backend(
        &self,
        workspace: &Path,
        remote_state_url: &str,
        env: &[(String, String)],
    ) -> Result<(), ProvisioningError> {
        let path = &self.config.state_backend_secret_path;
        let record = self.secrets.get_secret(path).await?;
        let username = require_str(&record, path, "username")?;
        let password = require_str(&record, path, "password")?;

        let args = vec![
            "remote".to_string(),
            "config".to_string(),
            "-backend=http".to_string(),
            format!("-backend-config=address={remote_state_url}"),
            format!("-backend-config=username={username}"),
            format!("-backend-config=password={password}"),
        ];
        self.run(workspace, &args, env).await
    }

    /// Short-lived cloud credentials for the job's provider scope,
    /// resolved per run and handed to the CLI as process environment.
    async fn cloud_env(
        &self,
        provider_slug: &str,
    ) -> Result<Vec<(String, String)>, ProvisioningError> {
        let provider = provider_slug.split(':').next().unwrap_or(provider_slug);
        let path = format!("{}/{}/credentials", self.config.provider_secret_root, provider);
        let data = self.secrets.get_secret(&path).await?;
        Ok(vec![
            (
                "AWS_ACCESS_KEY_ID".to_string(),
                require_str(&data, &path, "accessKeyID")?,
            ),
            (
                "AWS_SECRET_ACCESS_KEY".to_string(),
                require_str(&data, &path, "secretAccessKey")?,
            ),
            (
                "AWS_SESSION_TOKEN".to_string(),
                require_str(&data, &path, "sessionToken")?,
            ),
        ])
    }

    async fn execute(
        &self,
        job: &ProvisionJob,
        action: LifecycleAction,
    ) -> Result<(), ProvisioningError> {
        let workspace = allocate_workspace(
            &self.config.work_root,
            &job.name,
            self.config.workspace_max_retry,
        )
        .await?;
        let workspace = scopeguard::guard(workspace, |dir| {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                warn!("failed to remove workspace {}: {}", dir.display(), err);
            }
        });
        info!("workspace prepared at {}", workspace.display());

        unpack_archive(&workspace, &job.modules)?;

        let has_var_file = match &job.var_file {
            Some(bytes) => {
                std::fs::write(workspace.join(CUSTOM_VAR_FILE), bytes)?;
                true
            }
            None => false,
        };

        let env = self.cloud_env(&job.provider_slug).await?;
        debug!("remote state: {}", job.remote_state_url);
        self.configure_remote_backend(&workspace, &job.remote_state_url, &env)
            .await?;

        // Resolve module dependencies before the lifecycle action.
        self.run(&workspace, &["get".to_string()], &env).await?;

        let mut args = vec![action.as_str().to_string()];
        if let LifecycleAction::Destroy = action {
            // No interactive terminal is ever attached.
            args.push("-force".to_string());
        }
        if has_var_file {
            args.push(format!("-var-file={CUSTOM_VAR_FILE}"));
        }
        self.run(&workspace, &args, &env).await?;

        info!("{} complete for {}", action.as_str(), job.name);
        Ok(())
    }
}

#[async_trait]
impl ProvisioningEngine for TerraformEngine {
    async fn validate_modules(
        &self,
        quoin_name: &str,
        modules: &[u8],
    ) -> Result<(), ProvisioningError> {
        let workspace = allocate_workspace(
            &self.config.work_root,
            quoin_name,
            self.config.workspace_max_retry,
        )
        .await?;
        let workspace = scopeguard::guard(workspace, |dir| {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                warn!("failed to remove workspace {}: {}", dir.display(), err);
            }
        });
        info!("workspace prepared at {}", workspace.display());

        unpack_archive(&workspace, modules)?;
        self.run(&workspace, &["get".to_string()], &[]).await?;

        let mut args = vec!["plan".to_string()];
        // The module var file is optional in a bundle; only reference it
        // when the upload shipped one.
        if workspace.join(MODULE_VAR_FILE).exists() {
            args.push(format!("-var-file={MODULE_VAR_FILE}"));
        }
        args.push(format!("-state={DEFAULT_STATE_FILE}"));
        args.push(format!("-out={quoin_name}.tfplan"));
        self.run(&workspace, &args, &[]).await?;
        Ok(())
    }

    async fn apply(&self, job: &ProvisionJob) -> Result<(), ProvisioningError> {
        self.execute(job, LifecycleAction::Apply).await
    }

    async fn destroy(&self, job: &ProvisionJob) -> Result<(), ProvisioningError> {
        self.execute(job, LifecycleAction::Destroy).await
    }
}
