// ABOUTME: Application-wide error types for shipit.
// ABOUTME: Covers configuration loading and runtime connection failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("container {0} not found")]
    ContainerNotFound(String),

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("deployment failed at {stage}")]
    RunFailed { stage: String },
}

pub type Result<T> = std::result::Result<T, Error>;
