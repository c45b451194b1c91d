// ABOUTME: Error types for the deployment pipeline stages.
// ABOUTME: Each variant maps to one reportable error kind.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::ByteSize;
use crate::runtime::{ContainerError, ImageError, LogError, RuntimeInfoError};

/// A stage failure. Every variant is fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(
        "insufficient disk space under {}: {available} available, {required} required",
        .path.display()
    )]
    InsufficientCapacity {
        path: PathBuf,
        available: ByteSize,
        required: ByteSize,
    },

    #[error("secrets file not found: {}", .0.display())]
    SecretsFileMissing(PathBuf),

    #[error("secrets file {} is missing required keys: {}", .file.display(), .keys.join(", "))]
    MissingKeys { file: PathBuf, keys: Vec<String> },

    #[error("build context is missing: {}", display_paths(.paths))]
    MissingBuildContext { paths: Vec<PathBuf> },

    #[error("image build failed: {message}")]
    BuildFailed {
        message: String,
        log_tail: Vec<String>,
    },

    #[error("verification probe '{probe}' failed with exit code {exit_code}")]
    VerificationFailed {
        probe: String,
        exit_code: i64,
        output: Vec<String>,
    },

    #[error("failed to retire container {name}: {reason}")]
    RetireFailed { name: String, reason: String },

    #[error("failed to prepare mount {}: {reason}", .path.display())]
    ProvisionFailed { path: PathBuf, reason: String },

    #[error("failed to create container: {0}")]
    ContainerCreateFailed(String),

    #[error("failed to start container: {0}")]
    ContainerStartFailed(String),

    #[error("health check failed after {attempts} attempts")]
    HealthCheckFailed { attempts: u32, logs: Vec<String> },

    #[error(
        "identity strategy changed from {previous} to {current} (recorded in {}); \
         revert the config or remove the marker after fixing mount ownership",
        .marker.display()
    )]
    IdentityDrift {
        previous: String,
        current: String,
        marker: PathBuf,
    },

    #[error(
        "cannot determine the invoking uid/gid for the inherit identity strategy; \
         configure a fixed identity instead"
    )]
    InvokingIdentityUnknown,

    #[error("container engine error: {0}")]
    Runtime(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error kind for programmatic handling and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeployErrorKind {
    InsufficientCapacity,
    MissingConfiguration,
    MissingBuildContext,
    BuildFailed,
    VerificationFailed,
    DeployError,
    HealthCheckFailed,
    IdentityDrift,
    Runtime,
}

impl fmt::Display for DeployErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployErrorKind::InsufficientCapacity => "InsufficientCapacity",
            DeployErrorKind::MissingConfiguration => "MissingConfiguration",
            DeployErrorKind::MissingBuildContext => "MissingBuildContext",
            DeployErrorKind::BuildFailed => "BuildFailed",
            DeployErrorKind::VerificationFailed => "VerificationFailed",
            DeployErrorKind::DeployError => "DeployError",
            DeployErrorKind::HealthCheckFailed => "HealthCheckFailed",
            DeployErrorKind::IdentityDrift => "IdentityDrift",
            DeployErrorKind::Runtime => "Runtime",
        };
        f.write_str(name)
    }
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::InsufficientCapacity { .. } => DeployErrorKind::InsufficientCapacity,
            DeployError::SecretsFileMissing(_)
            | DeployError::MissingKeys { .. }
            | DeployError::InvokingIdentityUnknown => DeployErrorKind::MissingConfiguration,
            DeployError::MissingBuildContext { .. } => DeployErrorKind::MissingBuildContext,
            DeployError::BuildFailed { .. } => DeployErrorKind::BuildFailed,
            DeployError::VerificationFailed { .. } => DeployErrorKind::VerificationFailed,
            DeployError::RetireFailed { .. }
            | DeployError::ProvisionFailed { .. }
            | DeployError::ContainerCreateFailed(_)
            | DeployError::ContainerStartFailed(_) => DeployErrorKind::DeployError,
            DeployError::HealthCheckFailed { .. } => DeployErrorKind::HealthCheckFailed,
            DeployError::IdentityDrift { .. } => DeployErrorKind::IdentityDrift,
            DeployError::Runtime(_) => DeployErrorKind::Runtime,
        }
    }

    /// Output lines carried by the failure, if any.
    pub fn captured_logs(&self) -> &[String] {
        match self {
            DeployError::BuildFailed { log_tail, .. } => log_tail,
            DeployError::VerificationFailed { output, .. } => output,
            DeployError::HealthCheckFailed { logs, .. } => logs,
            _ => &[],
        }
    }
}

impl From<ImageError> for DeployError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::BuildFailed { message, log_tail } => {
                DeployError::BuildFailed { message, log_tail }
            }
            other => DeployError::Runtime(other.to_string()),
        }
    }
}

impl From<ContainerError> for DeployError {
    fn from(err: ContainerError) -> Self {
        DeployError::Runtime(err.to_string())
    }
}

impl From<LogError> for DeployError {
    fn from(err: LogError) -> Self {
        DeployError::Runtime(err.to_string())
    }
}

impl From<RuntimeInfoError> for DeployError {
    fn from(err: RuntimeInfoError) -> Self {
        DeployError::Runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_configuration_errors() {
        let err = DeployError::MissingKeys {
            file: PathBuf::from("/etc/app/.env"),
            keys: vec!["ANGEL_TOTP_SECRET".to_string()],
        };
        assert_eq!(err.kind(), DeployErrorKind::MissingConfiguration);
        assert!(err.to_string().contains("ANGEL_TOTP_SECRET"));
    }

    #[test]
    fn build_failure_keeps_log_tail() {
        let err: DeployError = ImageError::BuildFailed {
            message: "step 4 failed".to_string(),
            log_tail: vec!["ERROR: no matching distribution".to_string()],
        }
        .into();
        assert_eq!(err.kind(), DeployErrorKind::BuildFailed);
        assert_eq!(err.captured_logs().len(), 1);
    }

    #[test]
    fn launch_failures_share_deploy_kind() {
        let err = DeployError::ContainerStartFailed("port is already allocated".to_string());
        assert_eq!(err.kind(), DeployErrorKind::DeployError);
        assert!(err.captured_logs().is_empty());
    }
}
