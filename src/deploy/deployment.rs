// ABOUTME: Generic run struct parameterized by state marker.
// ABOUTME: State types carry their own data for compile-time guarantees.

use crate::config::RunConfig;
use crate::types::{ContainerName, ImageRef};

use super::builder::BuildResult;
use super::health::HealthReport;
use super::lifecycle::ContainerHandle;
use super::preflight::PreflightReport;
use super::state::{Built, Completed, Deployed, Initialized, Preflighted, Validated, Verified};

/// A deployment run in progress, parameterized by its current state.
///
/// Transitions consume the run, so a stage can only be entered after the
/// one before it succeeded.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) config: RunConfig,
    pub(crate) state: S,
}

impl Deployment<Initialized> {
    pub fn new(config: RunConfig) -> Self {
        Deployment {
            config,
            state: Initialized,
        }
    }
}

impl<S> Deployment<S> {
    pub fn container_name(&self) -> &ContainerName {
        &self.config.container
    }

    pub fn image(&self) -> &ImageRef {
        &self.config.image
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

impl Deployment<Preflighted> {
    pub fn preflight_report(&self) -> &PreflightReport {
        &self.state.report
    }
}

impl Deployment<Validated> {
    pub fn preflight_report(&self) -> &PreflightReport {
        &self.state.report
    }
}

impl Deployment<Built> {
    pub fn build_result(&self) -> &BuildResult {
        &self.state.build
    }
}

impl Deployment<Deployed> {
    pub fn handle(&self) -> &ContainerHandle {
        &self.state.handle
    }
}

impl Deployment<Verified> {
    pub fn handle(&self) -> &ContainerHandle {
        &self.state.handle
    }

    pub fn health(&self) -> &HealthReport {
        &self.state.health
    }
}

impl Deployment<Completed> {
    pub fn handle(&self) -> &ContainerHandle {
        &self.state.handle
    }

    pub fn build_result(&self) -> &BuildResult {
        &self.state.build
    }

    pub fn health(&self) -> &HealthReport {
        &self.state.health
    }
}
