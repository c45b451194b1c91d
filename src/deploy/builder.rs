// ABOUTME: Build stage: engine image build followed by verification probes.
// ABOUTME: Probes run in throwaway containers that are always removed.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::{RunConfig, VerificationProbe};
use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::{
    BuildRequest, ContainerConfig, ContainerOps, ContextError, ImageOps, LogOps,
    pack_build_context,
};
use crate::types::{ContainerId, ImageId, ImageRef};

use super::error::DeployError;
use super::labels;
use super::lifecycle;

/// Build output lines kept for failure reports.
const BUILD_LOG_TAIL: usize = 40;

/// Probe output lines kept for failure reports.
const PROBE_LOG_TAIL: u64 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub exit_code: i64,
    pub output: Vec<String>,
}

impl ProbeResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// A built and verified image.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub image: ImageRef,
    pub image_id: ImageId,
    pub probes: Vec<ProbeResult>,
}

/// Build the image from the configured context, then run every probe.
pub async fn build<R>(
    runtime: &R,
    config: &RunConfig,
    diag: &mut Diagnostics,
) -> Result<BuildResult, DeployError>
where
    R: ImageOps + ContainerOps + LogOps,
{
    let context_dir = config.build.context.clone();
    let dockerfile = config.build.dockerfile.clone();
    let context = tokio::task::spawn_blocking(move || pack_build_context(&context_dir, &dockerfile))
        .await
        .map_err(|e| DeployError::BuildFailed {
            message: format!("context packing task failed: {}", e),
            log_tail: Vec::new(),
        })?
        .map_err(|e| match e {
            ContextError::NotFound(path) => DeployError::MissingBuildContext { paths: vec![path] },
            other => DeployError::BuildFailed {
                message: other.to_string(),
                log_tail: Vec::new(),
            },
        })?;

    tracing::info!(
        image = %config.image,
        context_bytes = context.len(),
        no_cache = config.build.no_cache,
        "building image"
    );

    let output = runtime
        .build_image(&BuildRequest {
            context,
            dockerfile: config.build.dockerfile.clone(),
            tag: config.image.clone(),
            no_cache: config.build.no_cache,
            log_tail: BUILD_LOG_TAIL,
        })
        .await?;

    tracing::info!(image_id = %output.image_id.short(), "image built");

    let mut probes = Vec::with_capacity(config.build.probes.len());
    for probe in &config.build.probes {
        let result = run_probe(runtime, config, probe, diag).await?;
        if !result.passed() {
            return Err(DeployError::VerificationFailed {
                probe: result.name,
                exit_code: result.exit_code,
                output: result.output,
            });
        }
        tracing::info!(probe = %probe.name, "verification probe passed");
        probes.push(result);
    }

    Ok(BuildResult {
        image: config.image.clone(),
        image_id: output.image_id,
        probes,
    })
}

/// Run one probe container to completion and remove it.
pub async fn run_probe<R>(
    runtime: &R,
    config: &RunConfig,
    probe: &VerificationProbe,
    diag: &mut Diagnostics,
) -> Result<ProbeResult, DeployError>
where
    R: ContainerOps + LogOps,
{
    let name = config.container.probe_name(&probe.name);

    // A probe container left by an interrupted run would block the create.
    if let Ok(Some(stale)) = lifecycle::inspect_by_name(runtime, name.as_str()).await {
        tracing::debug!(container = %name, "removing stale probe container");
        runtime.remove_container(&stale.id, true).await?;
    }

    let mut labels = HashMap::new();
    labels.insert(labels::MANAGED.to_string(), "true".to_string());
    labels.insert(labels::PROBE.to_string(), config.container.to_string());

    let mut container = ContainerConfig::new(name.as_str(), config.image.clone());
    container.entrypoint = Some(probe.entrypoint());
    container.labels = labels;

    let id = match runtime.create_container(&container).await {
        Ok(id) => id,
        Err(e) => {
            return Ok(ProbeResult {
                name: probe.name.clone(),
                exit_code: -1,
                output: vec![format!("probe container could not be created: {}", e)],
            });
        }
    };

    let result = execute_probe(runtime, &id, probe).await;

    if let Err(e) = runtime.remove_container(&id, true).await
        && !e.is_not_found()
    {
        diag.warn(Warning::probe_cleanup(format!(
            "failed to remove probe container {}: {}",
            name, e
        )));
    }

    result
}

async fn execute_probe<R>(
    runtime: &R,
    id: &ContainerId,
    probe: &VerificationProbe,
) -> Result<ProbeResult, DeployError>
where
    R: ContainerOps + LogOps,
{
    if let Err(e) = runtime.start_container(id).await {
        return Ok(ProbeResult {
            name: probe.name.clone(),
            exit_code: -1,
            output: vec![format!("probe container failed to start: {}", e)],
        });
    }

    let exit_code = runtime.wait_container(id).await?;
    let output = runtime
        .tail_logs(id, PROBE_LOG_TAIL)
        .await
        .unwrap_or_else(|e| vec![format!("output unavailable: {}", e)]);

    tracing::debug!(probe = %probe.name, exit_code, "probe finished");

    Ok(ProbeResult {
        name: probe.name.clone(),
        exit_code,
        output,
    })
}
