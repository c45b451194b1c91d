// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: ContainerConfig, ContainerInfo, BuildRequest, PruneReport and metadata.

use crate::config::RestartPolicy;
use crate::types::{ContainerId, ImageId, ImageRef};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for creating a container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    pub env: BTreeMap<String, String>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMount>,
    /// Command to run (overrides image CMD).
    pub command: Option<Vec<String>>,
    /// Entrypoint (overrides image ENTRYPOINT).
    pub entrypoint: Option<Vec<String>>,
    /// `uid:gid` to run as; `None` keeps the image default.
    pub user: Option<String>,
    pub restart_policy: RestartPolicy,
    pub stop_timeout: Option<Duration>,
}

impl ContainerConfig {
    /// A bare config with no ports, mounts or restart behaviour.
    pub fn new(name: impl Into<String>, image: ImageRef) -> Self {
        Self {
            name: name.into(),
            image,
            env: BTreeMap::new(),
            labels: HashMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            command: None,
            entrypoint: None,
            user: None,
            restart_policy: RestartPolicy::No,
            stop_timeout: None,
        }
    }
}

/// TCP port published on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

/// Bind mount from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Information about a container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub user: Option<String>,
    pub created: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Removing => "removing",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image build input.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Tar archive of the build context.
    pub context: Vec<u8>,
    /// Dockerfile path relative to the context root.
    pub dockerfile: String,
    pub tag: ImageRef,
    pub no_cache: bool,
    /// Lines of build output kept for failure reports.
    pub log_tail: usize,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub image_id: ImageId,
    pub log: Vec<String>,
}

/// What a prune removed: images or build cache entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: usize,
    pub space_reclaimed: u64,
}

/// Engine metadata.
#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
    /// Engine name (e.g., "docker", "podman").
    pub name: String,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
    /// Storage root reported by the engine.
    pub root_dir: Option<PathBuf>,
}
