// ABOUTME: State transition methods for the deployment pipeline.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::collections::HashMap;
use std::path::Path;

use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::{ContainerFilters, ContainerOps, ImageOps, LogOps};

use super::Deployment;
use super::builder;
use super::error::DeployError;
use super::health::{self, HealthProbe};
use super::labels;
use super::lifecycle::{self, HostFs};
use super::preflight::{self, CapacityProbe};
use super::state::{
    Built, Cleaned, Completed, Deployed, Initialized, Preflighted, Validated, Verified,
};
use super::validate;

/// Result type for transitions whose failure leaves state worth reporting.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

impl<S> Deployment<S> {
    fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            config: self.config,
            state,
        }
    }
}

// =============================================================================
// Initialized -> Preflighted
// =============================================================================

impl Deployment<Initialized> {
    /// Measure storage and check the build context.
    ///
    /// # Errors
    ///
    /// `InsufficientCapacity` below `min_free`; `MissingBuildContext` when the
    /// Dockerfile or a required path is absent. An unavailable capacity probe
    /// only adds a warning.
    #[must_use = "deployment state must be used"]
    pub async fn preflight(
        self,
        storage_root: &Path,
        capacity: &dyn CapacityProbe,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<Preflighted>, DeployError> {
        let report = preflight::check(storage_root, &self.config, capacity, diag).await;
        preflight::enforce(&report, self.config.preflight.min_free)?;
        Ok(self.transition(Preflighted { report }))
    }
}

// =============================================================================
// Preflighted -> Validated
// =============================================================================

impl Deployment<Preflighted> {
    /// # Errors
    ///
    /// `MissingConfiguration` for an absent secrets file or missing keys,
    /// `IdentityDrift` when the identity strategy changed since the last run.
    #[must_use = "deployment state must be used"]
    pub fn validate(self, diag: &mut Diagnostics) -> Result<Deployment<Validated>, DeployError> {
        validate::validate(&self.state.report, &self.config, diag)?;
        let report = self.state.report.clone();
        Ok(self.transition(Validated { report }))
    }
}

// =============================================================================
// Validated -> Cleaned
// =============================================================================

impl Deployment<Validated> {
    /// Optionally retire the running instance, then prune dangling images
    /// and the build cache.
    #[must_use = "deployment state must be used"]
    pub async fn clean_old_artifacts<R: ContainerOps + ImageOps>(
        self,
        runtime: &R,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<Cleaned>, DeployError> {
        if self.config.cleanup.retire_before_build {
            let name = self.config.container.as_str();
            lifecycle::retire_existing(runtime, name, self.config.stop_timeout)
                .await
                .into_result(name)?;
        }

        if self.config.cleanup.prune_dangling {
            prune(runtime, diag).await;
        }
        if self.config.cleanup.prune_build_cache {
            prune_build_cache(runtime, diag).await;
        }

        Ok(self.transition(Cleaned))
    }
}

// =============================================================================
// Cleaned -> Built
// =============================================================================

impl Deployment<Cleaned> {
    /// Build the image and run every verification probe against it.
    ///
    /// # Errors
    ///
    /// `BuildFailed` or `VerificationFailed`. Probe containers are removed
    /// either way.
    #[must_use = "deployment state must be used"]
    pub async fn build<R: ContainerOps + ImageOps + LogOps>(
        self,
        runtime: &R,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<Built>, DeployError> {
        let build = builder::build(runtime, &self.config, diag).await?;
        Ok(self.transition(Built { build }))
    }
}

// =============================================================================
// Built -> Deployed
// =============================================================================

impl Deployment<Built> {
    /// Replace whatever holds the container name with the new instance.
    ///
    /// # Errors
    ///
    /// `DeployError` kinds for retirement, provisioning, create or start
    /// failures. A created but unstarted container is removed.
    #[must_use = "deployment state must be used"]
    pub async fn deploy<R: ContainerOps>(
        self,
        runtime: &R,
        fs: &dyn HostFs,
        invoking: Option<(u32, u32)>,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<Deployed>, DeployError> {
        let handle = lifecycle::deploy(
            runtime,
            &self.config,
            &self.state.build.image,
            fs,
            invoking,
            diag,
        )
        .await?;
        let build = self.state.build.clone();
        Ok(self.transition(Deployed { build, handle }))
    }
}

// =============================================================================
// Deployed -> Verified
// =============================================================================

impl Deployment<Deployed> {
    /// Poll the health endpoint.
    ///
    /// On failure the run is handed back with the error so the caller can
    /// report the instance, which is left running for inspection.
    #[must_use = "deployment state must be used"]
    pub async fn verify_health<R: LogOps>(
        self,
        runtime: &R,
        probe: &dyn HealthProbe,
    ) -> TransitionResult<Verified, Deployed> {
        let report =
            health::await_healthy(runtime, &self.state.handle, probe, &self.config.health).await;

        match report.into_result() {
            Ok(health) => {
                let Deployed { build, handle } = self.state.clone();
                Ok(self.transition(Verified {
                    build,
                    handle,
                    health,
                }))
            }
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// Verified -> Completed
// =============================================================================

impl Deployment<Verified> {
    /// Best-effort removal of leftovers: stray probe containers and the
    /// image the new build untagged. Failures become warnings.
    pub async fn cleanup<R: ContainerOps + ImageOps>(
        self,
        runtime: &R,
        diag: &mut Diagnostics,
    ) -> Deployment<Completed> {
        let mut filter_labels = HashMap::new();
        filter_labels.insert(labels::PROBE.to_string(), self.config.container.to_string());
        let filters = ContainerFilters {
            labels: filter_labels,
            name: None,
            all: true,
        };

        match runtime.list_containers(&filters).await {
            Ok(stray) => {
                for container in stray {
                    if let Err(e) = runtime.remove_container(&container.id, true).await {
                        diag.warn(Warning::probe_cleanup(format!(
                            "failed to remove probe container {}: {}",
                            container.name, e
                        )));
                    }
                }
            }
            Err(e) => diag.warn(Warning::probe_cleanup(format!(
                "failed to list probe containers: {}",
                e
            ))),
        }

        if self.config.cleanup.prune_dangling {
            prune(runtime, diag).await;
        }

        let Verified {
            build,
            handle,
            health,
        } = self.state.clone();
        self.transition(Completed {
            build,
            handle,
            health,
        })
    }
}

async fn prune<R: ImageOps>(runtime: &R, diag: &mut Diagnostics) {
    match runtime.prune_dangling_images().await {
        Ok(report) => tracing::info!(
            images = report.deleted,
            reclaimed = report.space_reclaimed,
            "pruned dangling images"
        ),
        Err(e) => diag.warn(Warning::prune_failed(format!(
            "failed to prune dangling images: {}",
            e
        ))),
    }
}

async fn prune_build_cache<R: ImageOps>(runtime: &R, diag: &mut Diagnostics) {
    match runtime.prune_build_cache().await {
        Ok(report) => tracing::info!(
            entries = report.deleted,
            reclaimed = report.space_reclaimed,
            "pruned build cache"
        ),
        Err(e) => diag.warn(Warning::prune_failed(format!(
            "failed to prune build cache: {}",
            e
        ))),
    }
}
