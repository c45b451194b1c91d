// ABOUTME: Drives a deployment run through every stage in order.
// ABOUTME: Any stage failure short-circuits to the report with the failing stage recorded.

use std::path::Path;

use chrono::Utc;

use crate::config::RunConfig;
use crate::diagnostics::Diagnostics;
use crate::output::Output;
use crate::runtime::FullRuntime;
use crate::types::ContainerId;

use super::Deployment;
use super::error::DeployError;
use super::health::HealthProbe;
use super::lifecycle::HostFs;
use super::preflight::{self, CapacityProbe};
use super::report::{RunOutcome, remediation_hints};
use super::state::{Completed, Initialized, Stage};

/// Host-side collaborators of a run.
pub struct PipelineDeps<'a> {
    pub capacity: &'a dyn CapacityProbe,
    pub fs: &'a dyn HostFs,
    pub health: &'a dyn HealthProbe,
    /// Invoking uid/gid, used by the inherit identity strategy.
    pub invoking: Option<(u32, u32)>,
}

/// The stage that aborted a run and why.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: DeployError,
    /// Instance left behind by the failing stage, if any.
    pub container: Option<ContainerId>,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(DeployError) -> Self {
        move |error| Self {
            stage,
            error,
            container: None,
        }
    }
}

/// Run every stage and produce the outcome. Never returns early: failures
/// are folded into the outcome.
pub async fn execute<R: FullRuntime>(
    config: RunConfig,
    runtime: &R,
    deps: &PipelineDeps<'_>,
    output: &Output,
) -> RunOutcome {
    let started_at = Utc::now();
    let mut diag = Diagnostics::default();

    let container = config.container.to_string();
    let image = config.image.to_string();
    let access_point = config.access_point();

    let storage_root = preflight::resolve_storage_root(&config, runtime, &mut diag).await;
    let result = drive(
        Deployment::<Initialized>::new(config),
        runtime,
        deps,
        &storage_root,
        output,
        &mut diag,
    )
    .await;

    output.progress(&format!("  → {}...", Stage::Report));
    let storage = match deps.capacity.usage(&storage_root).await {
        Ok(usage) => Some(usage),
        Err(e) => {
            tracing::debug!(root = %storage_root.display(), "storage report unavailable: {}", e);
            None
        }
    };

    let mut outcome = RunOutcome {
        success: false,
        container,
        image,
        failed_stage: None,
        error_kind: None,
        error: None,
        logs: Vec::new(),
        hints: Vec::new(),
        warnings: Vec::new(),
        access_point: None,
        container_id: None,
        image_id: None,
        health: None,
        storage_root,
        storage,
        started_at,
        finished_at: started_at,
    };

    match result {
        Ok(done) => {
            outcome.success = true;
            outcome.access_point = Some(access_point);
            outcome.container_id = Some(done.handle().id.to_string());
            outcome.image_id = Some(done.build_result().image_id.to_string());
            outcome.health = Some(done.health().clone());
        }
        Err(failure) => {
            tracing::error!(stage = %failure.stage, "run failed: {}", failure.error);
            let kind = failure.error.kind();
            outcome.failed_stage = Some(failure.stage);
            outcome.error_kind = Some(kind);
            outcome.error = Some(failure.error.to_string());
            outcome.logs = failure.error.captured_logs().to_vec();
            outcome.hints = remediation_hints(kind, &outcome.container);
            outcome.container_id = failure.container.map(|id| id.to_string());
        }
    }

    outcome.warnings = diag.into_warnings();
    outcome.finished_at = Utc::now();
    outcome
}

async fn drive<R: FullRuntime>(
    deployment: Deployment<Initialized>,
    runtime: &R,
    deps: &PipelineDeps<'_>,
    storage_root: &Path,
    output: &Output,
    diag: &mut Diagnostics,
) -> Result<Deployment<Completed>, StageFailure> {
    let name = deployment.container_name().to_string();

    enter(output, Stage::Preflight, &name);
    let deployment = deployment
        .preflight(storage_root, deps.capacity, diag)
        .await
        .map_err(StageFailure::at(Stage::Preflight))?;

    enter(output, Stage::ValidateConfig, &name);
    let deployment = deployment
        .validate(diag)
        .map_err(StageFailure::at(Stage::ValidateConfig))?;

    enter(output, Stage::CleanOldArtifacts, &name);
    let deployment = deployment
        .clean_old_artifacts(runtime, diag)
        .await
        .map_err(StageFailure::at(Stage::CleanOldArtifacts))?;

    enter(output, Stage::Build, &name);
    let deployment = deployment
        .build(runtime, diag)
        .await
        .map_err(StageFailure::at(Stage::Build))?;
    for probe in &deployment.build_result().probes {
        output.progress(&format!("  ✓ probe {} passed", probe.name));
    }

    enter(output, Stage::Deploy, &name);
    let deployment = deployment
        .deploy(runtime, deps.fs, deps.invoking, diag)
        .await
        .map_err(StageFailure::at(Stage::Deploy))?;

    enter(output, Stage::VerifyHealth, &name);
    let deployment = match deployment.verify_health(runtime, deps.health).await {
        Ok(verified) => verified,
        Err((deployed, error)) => {
            return Err(StageFailure {
                stage: Stage::VerifyHealth,
                error,
                container: Some(deployed.handle().id.clone()),
            });
        }
    };
    output.progress(&format!(
        "  ✓ healthy after {} attempt(s)",
        deployment.health().attempts
    ));

    enter(output, Stage::Cleanup, &name);
    Ok(deployment.cleanup(runtime, diag).await)
}

fn enter(output: &Output, stage: Stage, container: &str) {
    tracing::info!(%stage, container, "entering stage");
    output.progress(&format!("  → {}...", stage));
}
