// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle integration tests
//!
//! Drive the orchestration services and the async worker over in-memory
//! repositories, the in-process queue-group bus, and a scripted
//! provisioning engine.

use aegis_provisioner_core::application::infrastructure_service::{
    CreateInfrastructureRequest, InfrastructureService, StandardInfrastructureService,
};
use aegis_provisioner_core::application::quoin_service::{QuoinService, StandardQuoinService};
use aegis_provisioner_core::application::worker::InfrastructureWorker;
use aegis_provisioner_core::domain::authorization::{Authorization, User};
use aegis_provisioner_core::domain::bus::MessageBus;
use aegis_provisioner_core::domain::error::OrchestrationError;
use aegis_provisioner_core::domain::infrastructure::Infrastructure;
use aegis_provisioner_core::domain::job::Subject;
use aegis_provisioner_core::domain::provisioning::{
    ProvisionJob, ProvisioningEngine, ProvisioningError,
};
use aegis_provisioner_core::domain::quoin::QuoinVar;
use aegis_provisioner_core::domain::repository::InfrastructureRepository;
use aegis_provisioner_core::domain::status::Status;
use aegis_provisioner_core::infrastructure::message_bus::InProcessBus;
use aegis_provisioner_core::infrastructure::repositories::{
    InMemoryInfrastructureRepository, InMemoryQuoinArchiveRepository, InMemoryQuoinRepository,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ENDPOINT: &str = "http://localhost:8088";

/// Engine double: records every call and fails on demand.
#[derive(Default)]
struct ScriptedEngine {
    fail_validation: Mutex<Option<String>>,
    fail_apply: Mutex<Option<String>>,
    validated: Mutex<Vec<(String, Vec<u8>)>>,
    applied: Mutex<Vec<ProvisionJob>>,
    destroyed: Mutex<Vec<ProvisionJob>>,
}

impl ScriptedEngine {
    fn fail_validation_with(&self, stderr: &str) {
        *self.fail_validation.lock().unwrap() = Some(stderr.to_string());
    }

    fn fail_apply_with(&self, stderr: &str) {
        *self.fail_apply.lock().unwrap() = Some(stderr.to_string());
    }

    fn clear_apply_failure(&self) {
        *self.fail_apply.lock().unwrap() = None;
    }

    fn execution_error(action: &str, stderr: String) -> ProvisioningError {
        ProvisioningError::Execution {
            action: action.to_string(),
            stderr,
        }
    }
}

#[async_trait]
impl ProvisioningEngine for ScriptedEngine {
    async fn validate_modules(
        &self,
        quoin_name: &str,
        modules: &[u8],
    ) -> Result<(), ProvisioningError> {
        if let Some(stderr) = self.fail_validation.lock().unwrap().clone() {
            return Err(Self::execution_error("plan", stderr));
        }
        self.validated
            .lock()
            .unwrap()
            .push((quoin_name.to_string(), modules.to_vec()));
        Ok(())
    }

    async fn apply(&self, job: &ProvisionJob) -> Result<(), ProvisioningError> {
        if let Some(stderr) = self.fail_apply.lock().unwrap().clone() {
            return Err(Self::execution_error("apply", stderr));
        }
        self.applied.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn destroy(&self, job: &ProvisionJob) -> Result<(), ProvisioningError> {
        self.destroyed.lock().unwrap().push(job.clone());
        Ok(())
    }
}

struct Harness {
    quoins: Arc<InMemoryQuoinRepository>,
    archives: Arc<InMemoryQuoinArchiveRepository>,
    infrastructures: Arc<InMemoryInfrastructureRepository>,
    bus: Arc<InProcessBus>,
    engine: Arc<ScriptedEngine>,
}

impl Harness {
    fn new() -> Self {
        Self {
            quoins: Arc::new(InMemoryQuoinRepository::new()),
            archives: Arc::new(InMemoryQuoinArchiveRepository::new()),
            infrastructures: Arc::new(InMemoryInfrastructureRepository::new()),
            bus: Arc::new(InProcessBus::new()),
            engine: Arc::new(ScriptedEngine::default()),
        }
    }

    fn quoin_service(&self, user: &User) -> Arc<dyn QuoinService> {
        Arc::new(StandardQuoinService::new(
            user.clone(),
            self.quoins.clone(),
            self.archives.clone(),
            self.infrastructures.clone(),
            self.engine.clone(),
            ENDPOINT.to_string(),
        ))
    }

    fn infrastructure_service(&self, user: &User) -> Arc<dyn InfrastructureService> {
        Arc::new(StandardInfrastructureService::new(
            user.clone(),
            self.infrastructures.clone(),
            self.quoins.clone(),
            self.bus.clone(),
        ))
    }

    fn worker(&self) -> Arc<InfrastructureWorker> {
        let agent = User::agent();
        InfrastructureWorker::new(
            self.infrastructure_service(&agent),
            self.quoin_service(&agent),
            self.engine.clone(),
            ENDPOINT.to_string(),
        )
    }

    /// Set up a VALIDATED quoin the way a client would: create, then
    /// upload a valid archive.
    async fn validated_quoin(&self, user: &User, name: &str) {
        let quoins = self.quoin_service(user);
        quoins
            .create_quoin(name.to_string(), vec![])
            .await
            .unwrap();
        quoins
            .create_quoin_archive(name.to_string(), b"modules".to_vec())
            .await
            .unwrap();
    }

    async fn stored_status(&self, name: &str) -> Status {
        self.infrastructures
            .find_by_name(name)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

fn alice() -> User {
    User::new("alice", "platform")
}

fn create_request(name: &str, quoin_name: &str) -> CreateInfrastructureRequest {
    CreateInfrastructureRequest {
        name: name.to_string(),
        quoin_name: quoin_name.to_string(),
        variables: vec![QuoinVar::new("region", "us-west-2")],
        provider_slug: "aws:account".to_string(),
    }
}

async fn expect_no_job(
    jobs: &mut aegis_provisioner_core::domain::bus::JobStream,
) {
    let next = tokio::time::timeout(Duration::from_millis(50), jobs.next()).await;
    assert!(next.is_err(), "no job should have been published");
}

// ----------------------------------------------------------------------------
// Quoin lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn quoin_validates_on_first_archive_upload() {
    let harness = Harness::new();
    let quoins = harness.quoin_service(&alice());

    let quoin = quoins.create_quoin("vpc-basic".into(), vec![]).await.unwrap();
    assert_eq!(quoin.status, Status::Default);
    assert!(quoin.archive_uri.is_none());

    let archive = quoins
        .create_quoin_archive("vpc-basic".into(), b"modules".to_vec())
        .await
        .unwrap();

    let stored = quoins.get_quoin("vpc-basic").await.unwrap();
    assert_eq!(stored.status, Status::Validated);
    let uri = stored.archive_uri.unwrap();
    assert!(uri.ends_with(&format!("/upload/{}", archive.id)));
    assert!(uri.starts_with(ENDPOINT));

    // The engine saw exactly the uploaded bytes.
    let validated = harness.engine.validated.lock().unwrap();
    assert_eq!(validated.len(), 1);
    assert_eq!(validated[0].1, b"modules");
}

#[tokio::test]
async fn archive_revalidation_is_idempotent() {
    let harness = Harness::new();
    let quoins = harness.quoin_service(&alice());
    quoins.create_quoin("vpc-basic".into(), vec![]).await.unwrap();

    quoins
        .create_quoin_archive("vpc-basic".into(), b"modules".to_vec())
        .await
        .unwrap();
    quoins
        .create_quoin_archive("vpc-basic".into(), b"modules".to_vec())
        .await
        .unwrap();

    assert_eq!(
        quoins.get_quoin("vpc-basic").await.unwrap().status,
        Status::Validated
    );
    assert_eq!(
        quoins.get_quoin_archive_ids("vpc-basic").await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn rejected_archive_leaves_no_trace() {
    let harness = Harness::new();
    let quoins = harness.quoin_service(&alice());
    quoins.create_quoin("vpc-basic".into(), vec![]).await.unwrap();
    harness.engine.fail_validation_with("syntax error in main.tf");

    let result = quoins
        .create_quoin_archive("vpc-basic".into(), b"broken".to_vec())
        .await;
    assert!(matches!(result, Err(OrchestrationError::Validation(_))));

    let quoin = quoins.get_quoin("vpc-basic").await.unwrap();
    assert_eq!(quoin.status, Status::Default);
    assert!(quoin.archive_uri.is_none());
    assert!(quoins
        .get_quoin_archive_ids("vpc-basic")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn duplicate_quoin_conflicts_unless_obsoleted() {
    let harness = Harness::new();
    let quoins = harness.quoin_service(&alice());
    quoins.create_quoin("vpc-basic".into(), vec![]).await.unwrap();

    let duplicate = quoins.create_quoin("vpc-basic".into(), vec![]).await;
    assert!(matches!(duplicate, Err(OrchestrationError::Conflict(_))));

    quoins.delete_quoin("vpc-basic").await.unwrap();
    assert_eq!(
        quoins.get_quoin("vpc-basic").await.unwrap().status,
        Status::Obsoleted
    );

    // Obsoleted quoins may be re-created in place.
    let recreated = quoins.create_quoin("vpc-basic".into(), vec![]).await.unwrap();
    assert_eq!(recreated.status, Status::Default);
}

#[tokio::test]
async fn quoin_delete_refused_while_referenced() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;
    let quoins = harness.quoin_service(&user);
    let infrastructures = harness.infrastructure_service(&user);

    infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    let result = quoins.delete_quoin("vpc-basic").await;
    assert!(matches!(result, Err(OrchestrationError::Conflict(_))));

    // Once the environment is destroyed the reference count drops to zero.
    infrastructures
        .update_infrastructure_status("env1", Status::Destroyed)
        .await
        .unwrap();
    quoins.delete_quoin("vpc-basic").await.unwrap();
}

// ----------------------------------------------------------------------------
// Infrastructure creation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn create_persists_validated_and_publishes_job() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;

    let mut jobs = harness
        .bus
        .subscribe_queue_group(Subject::CreateInfra, "probe")
        .await
        .unwrap();

    let infrastructures = harness.infrastructure_service(&user);
    let created = infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    assert_eq!(created.status, Status::Validated);
    assert_eq!(harness.stored_status("env1").await, Status::Validated);

    let job = jobs.next().await.unwrap();
    assert_eq!(job.name, "env1");
    assert_eq!(job.quoin.name, "vpc-basic");
    assert!(job.quoin.archive_uri.is_some());
}

#[tokio::test]
async fn create_rejects_unvalidated_quoin_without_side_effects() {
    let harness = Harness::new();
    let user = alice();
    let quoins = harness.quoin_service(&user);
    quoins.create_quoin("vpc-basic".into(), vec![]).await.unwrap();

    let mut jobs = harness
        .bus
        .subscribe_queue_group(Subject::CreateInfra, "probe")
        .await
        .unwrap();

    let infrastructures = harness.infrastructure_service(&user);
    let result = infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await;

    assert!(matches!(result, Err(OrchestrationError::Validation(_))));
    assert!(harness
        .infrastructures
        .find_by_name("env1")
        .await
        .unwrap()
        .is_none());
    expect_no_job(&mut jobs).await;
}

#[tokio::test]
async fn create_conflicts_while_live_and_permits_retry_after_failure() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;
    let infrastructures = harness.infrastructure_service(&user);

    infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    for status in [Status::Running, Status::Deployed, Status::Obsoleted] {
        infrastructures
            .update_infrastructure_status("env1", status)
            .await
            .unwrap();
        let result = infrastructures
            .create_infrastructure(create_request("env1", "vpc-basic"))
            .await;
        assert!(
            matches!(result, Err(OrchestrationError::Conflict(_))),
            "expected conflict while {status}"
        );
    }

    // FAILED is retry-eligible.
    infrastructures
        .update_infrastructure_status("env1", Status::Failed)
        .await
        .unwrap();
    let retried = infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();
    assert_eq!(retried.status, Status::Validated);
}

// ----------------------------------------------------------------------------
// Infrastructure deletion
// ----------------------------------------------------------------------------

#[tokio::test]
async fn delete_requires_state_and_settled_status() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;
    let infrastructures = harness.infrastructure_service(&user);

    infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    let mut jobs = harness
        .bus
        .subscribe_queue_group(Subject::DeleteInfra, "probe")
        .await
        .unwrap();

    // Never deployed: no state yet.
    let result = infrastructures.delete_infrastructure("env1").await;
    assert!(matches!(result, Err(OrchestrationError::Conflict(_))));
    expect_no_job(&mut jobs).await;

    let mut state = std::collections::HashMap::new();
    state.insert("vpc_id".to_string(), serde_json::json!("vpc-123"));
    infrastructures
        .update_infrastructure_state("env1", state)
        .await
        .unwrap();

    // Mid-flight: RUNNING blocks deletion even with state.
    infrastructures
        .update_infrastructure_status("env1", Status::Running)
        .await
        .unwrap();
    let result = infrastructures.delete_infrastructure("env1").await;
    assert!(matches!(result, Err(OrchestrationError::Conflict(_))));
    expect_no_job(&mut jobs).await;

    infrastructures
        .update_infrastructure_status("env1", Status::Deployed)
        .await
        .unwrap();
    infrastructures.delete_infrastructure("env1").await.unwrap();

    assert_eq!(harness.stored_status("env1").await, Status::Running);
    let job = jobs.next().await.unwrap();
    assert_eq!(job.name, "env1");
    // Bus payload-size discipline: the snapshot travels without state.
    assert!(job.state.is_empty());
}

// ----------------------------------------------------------------------------
// Authorization
// ----------------------------------------------------------------------------

#[tokio::test]
async fn foreign_resources_look_absent_to_non_owners() {
    let harness = Harness::new();
    let owner = alice();
    harness.validated_quoin(&owner, "vpc-basic").await;
    harness
        .infrastructure_service(&owner)
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    let mallory = User::new("mallory", "intruders");
    let quoins = harness.quoin_service(&mallory);
    let infrastructures = harness.infrastructure_service(&mallory);

    assert!(matches!(
        quoins.get_quoin("vpc-basic").await,
        Err(OrchestrationError::NotFound(_))
    ));
    assert!(matches!(
        infrastructures.get_infrastructure("env1").await,
        Err(OrchestrationError::NotFound(_))
    ));
    assert!(matches!(
        infrastructures.delete_infrastructure("env1").await,
        Err(OrchestrationError::NotFound(_))
    ));
    // Creating against someone else's quoin fails the same way.
    assert!(matches!(
        infrastructures
            .create_infrastructure(create_request("env2", "vpc-basic"))
            .await,
        Err(OrchestrationError::NotFound(_))
    ));
}

#[tokio::test]
async fn agent_identity_bypasses_ownership() {
    let harness = Harness::new();
    harness.validated_quoin(&alice(), "vpc-basic").await;
    harness
        .infrastructure_service(&alice())
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    let agent_service = harness.infrastructure_service(&User::agent());
    agent_service
        .update_infrastructure_status("env1", Status::Running)
        .await
        .unwrap();
    assert_eq!(harness.stored_status("env1").await, Status::Running);
}

#[tokio::test]
async fn created_resources_carry_default_authorization() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;
    harness
        .infrastructure_service(&user)
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    let stored: Infrastructure = harness
        .infrastructures
        .find_by_name("env1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.authorization, Authorization::bind_default(&user));
}

// ----------------------------------------------------------------------------
// Async worker
// ----------------------------------------------------------------------------

#[tokio::test]
async fn worker_deploys_and_records_success() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;

    let snapshot = harness
        .infrastructure_service(&user)
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    let worker = harness.worker();
    worker.process(Subject::CreateInfra, snapshot).await;

    assert_eq!(harness.stored_status("env1").await, Status::Deployed);

    let applied = harness.engine.applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    let job = &applied[0];
    assert_eq!(job.name, "env1");
    assert_eq!(job.modules, b"modules");
    assert_eq!(
        job.remote_state_url,
        format!("{ENDPOINT}/infrastructure/env1/state")
    );
    assert_eq!(job.provider_slug, "aws:account");
    // region variable renders into the var file.
    let var_file = String::from_utf8(job.var_file.clone().unwrap()).unwrap();
    assert_eq!(var_file, "region=\"us-west-2\"\n");
}

#[tokio::test]
async fn worker_failure_marks_failed_and_retry_clears_error() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;
    let infrastructures = harness.infrastructure_service(&user);

    let snapshot = infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    harness.engine.fail_apply_with("provider quota exceeded");
    let worker = harness.worker();
    worker.process(Subject::CreateInfra, snapshot).await;

    let stored = harness
        .infrastructures
        .find_by_name("env1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, Status::Failed);
    assert!(stored
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("provider quota exceeded"));

    // A fresh create retries the FAILED environment and the worker clears
    // the recorded error on success.
    harness.engine.clear_apply_failure();
    let snapshot = infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();
    worker.process(Subject::CreateInfra, snapshot).await;

    let stored = harness
        .infrastructures
        .find_by_name("env1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, Status::Deployed);
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn worker_destroys_on_delete_job() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;
    let infrastructures = harness.infrastructure_service(&user);

    infrastructures
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();
    let mut state = std::collections::HashMap::new();
    state.insert("vpc_id".to_string(), serde_json::json!("vpc-123"));
    infrastructures
        .update_infrastructure_state("env1", state)
        .await
        .unwrap();
    infrastructures
        .update_infrastructure_status("env1", Status::Deployed)
        .await
        .unwrap();

    let mut jobs = harness
        .bus
        .subscribe_queue_group(Subject::DeleteInfra, "probe")
        .await
        .unwrap();
    infrastructures.delete_infrastructure("env1").await.unwrap();
    let snapshot = jobs.next().await.unwrap();

    let worker = harness.worker();
    worker.process(Subject::DeleteInfra, snapshot).await;

    assert_eq!(harness.stored_status("env1").await, Status::Destroyed);
    assert_eq!(harness.engine.destroyed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn worker_consumes_published_jobs_until_shutdown() {
    let harness = Harness::new();
    let user = alice();
    harness.validated_quoin(&user, "vpc-basic").await;

    let shutdown = CancellationToken::new();
    let worker = harness.worker();
    let run = tokio::spawn(worker.run(Subject::CreateInfra, shutdown.clone()));

    // Give the subscription a moment to register before publishing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness
        .infrastructure_service(&user)
        .create_infrastructure(create_request("env1", "vpc-basic"))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if harness.stored_status("env1").await == Status::Deployed {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker never deployed env1"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    run.await.unwrap().unwrap();
}
