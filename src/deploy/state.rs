// ABOUTME: Run state markers for the type state pattern.
// ABOUTME: Each marker carries the data earlier stages produced.

use serde::Serialize;
use std::fmt;

use super::builder::BuildResult;
use super::health::HealthReport;
use super::lifecycle::ContainerHandle;
use super::preflight::PreflightReport;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preflight,
    ValidateConfig,
    CleanOldArtifacts,
    Build,
    Deploy,
    VerifyHealth,
    Cleanup,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "preflight",
            Stage::ValidateConfig => "validate config",
            Stage::CleanOldArtifacts => "clean old artifacts",
            Stage::Build => "build",
            Stage::Deploy => "deploy",
            Stage::VerifyHealth => "verify health",
            Stage::Cleanup => "cleanup",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

/// Nothing checked yet.
/// Available actions: `preflight()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Host capacity and build context checked.
/// Available actions: `validate()`
#[derive(Debug, Clone)]
pub struct Preflighted {
    pub(crate) report: PreflightReport,
}

/// Secrets and identity strategy validated.
/// Available actions: `clean_old_artifacts()`
#[derive(Debug, Clone)]
pub struct Validated {
    pub(crate) report: PreflightReport,
}

/// Dangling artifacts pruned.
/// Available actions: `build()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Cleaned;

/// Image built and verified.
/// Available actions: `deploy()`
#[derive(Debug, Clone)]
pub struct Built {
    pub(crate) build: BuildResult,
}

/// New instance started.
/// Available actions: `verify_health()`
#[derive(Debug, Clone)]
pub struct Deployed {
    pub(crate) build: BuildResult,
    pub(crate) handle: ContainerHandle,
}

/// New instance answered its health endpoint.
/// Available actions: `cleanup()`
#[derive(Debug, Clone)]
pub struct Verified {
    pub(crate) build: BuildResult,
    pub(crate) handle: ContainerHandle,
    pub(crate) health: HealthReport,
}

/// Run finished successfully.
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) build: BuildResult,
    pub(crate) handle: ContainerHandle,
    pub(crate) health: HealthReport,
}
