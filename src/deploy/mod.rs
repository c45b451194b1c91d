// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports stage components, state markers and the pipeline driver.

mod builder;
mod deployment;
mod error;
mod health;
pub mod labels;
mod lifecycle;
mod pipeline;
mod preflight;
mod report;
mod state;
mod transitions;
mod validate;

pub use builder::{BuildResult, ProbeResult, build, run_probe};
pub use deployment::Deployment;
pub use error::{DeployError, DeployErrorKind};
pub use health::{
    HealthProbe, HealthProbeError, HealthReport, HealthStatus, HttpProbe, await_healthy,
};
pub use lifecycle::{
    ContainerHandle, HostFs, LocalFs, RetireOutcome, container_config, container_user, deploy,
    inspect_by_name, provision_mounts, retire_existing, writable_mount_sources,
};
pub use pipeline::{PipelineDeps, StageFailure, execute};
pub use preflight::{
    CapacityError, CapacityProbe, CheckItem, DEFAULT_STORAGE_ROOT, DfProbe, PreflightReport,
    StorageUsage, check, enforce, key_assigned, missing_keys, parse_df_output,
    resolve_storage_root,
};
pub use report::{RunOutcome, remediation_hints, render, storage_line};
pub use state::{
    Built, Cleaned, Completed, Deployed, Initialized, Preflighted, Stage, Validated, Verified,
};
pub use transitions::TransitionResult;
pub use validate::{IdentityRecord, MarkerError, validate};
