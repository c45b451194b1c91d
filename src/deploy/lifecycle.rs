// ABOUTME: Container lifecycle: idempotent retirement, mount provisioning, launch.
// ABOUTME: Provisioning follows the identity policy; launch cleans up a half-created container.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::config::{IdentityPolicy, RunConfig};
use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::{
    ContainerConfig, ContainerError, ContainerInfo, ContainerOps, ContainerState, PortMapping,
    VolumeMount,
};
use crate::types::{ContainerId, ImageRef};

use super::error::DeployError;
use super::labels;
use super::validate::IdentityRecord;

const FIXED_MODE: u32 = 0o755;
const INHERIT_MODE: u32 = 0o777;

/// The launched instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerHandle {
    pub name: String,
    pub id: ContainerId,
}

/// Result of retiring whatever holds a container name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetireOutcome {
    Removed(ContainerId),
    AlreadyAbsent,
    RemovalFailed(String),
}

impl RetireOutcome {
    pub fn into_result(self, name: &str) -> Result<Option<ContainerId>, DeployError> {
        match self {
            RetireOutcome::Removed(id) => Ok(Some(id)),
            RetireOutcome::AlreadyAbsent => Ok(None),
            RetireOutcome::RemovalFailed(reason) => Err(DeployError::RetireFailed {
                name: name.to_string(),
                reason,
            }),
        }
    }
}

/// Inspect the container named exactly `name`.
///
/// The engine also resolves ids and id prefixes, so a hex-looking name can
/// land on an unrelated container; those hits are reported as absent.
pub async fn inspect_by_name<R: ContainerOps>(
    runtime: &R,
    name: &str,
) -> Result<Option<ContainerInfo>, ContainerError> {
    match runtime.inspect_container(name).await {
        Ok(info) if info.name == name => Ok(Some(info)),
        Ok(info) => {
            tracing::debug!(name, resolved = %info.name, "lookup resolved to another container");
            Ok(None)
        }
        Err(ContainerError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Stop then remove the container holding `name`, if any.
///
/// "Not found" and "not running" are treated as already done.
pub async fn retire_existing<R: ContainerOps>(
    runtime: &R,
    name: &str,
    stop_timeout: Duration,
) -> RetireOutcome {
    let info = match inspect_by_name(runtime, name).await {
        Ok(Some(info)) => info,
        Ok(None) => return RetireOutcome::AlreadyAbsent,
        Err(e) => return RetireOutcome::RemovalFailed(e.to_string()),
    };

    if matches!(
        info.state,
        ContainerState::Running | ContainerState::Restarting | ContainerState::Paused
    ) {
        match runtime.stop_container(&info.id, stop_timeout).await {
            Ok(()) | Err(ContainerError::NotRunning(_)) => {}
            Err(ContainerError::NotFound(_)) => return RetireOutcome::AlreadyAbsent,
            // Force removal below still kills the process.
            Err(e) => tracing::debug!(container = %name, "stop failed, forcing removal: {}", e),
        }
    }

    match runtime.remove_container(&info.id, true).await {
        Ok(()) => {
            tracing::info!(container = %name, id = %info.id.short(), "retired previous instance");
            RetireOutcome::Removed(info.id)
        }
        Err(ContainerError::NotFound(_)) => RetireOutcome::AlreadyAbsent,
        Err(e) => RetireOutcome::RemovalFailed(e.to_string()),
    }
}

/// Host filesystem operations used to prepare bind-mount sources.
pub trait HostFs: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> std::io::Result<()>;
    fn set_mode(&self, path: &Path, mode: u32) -> std::io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl HostFs for LocalFs {
    fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
        std::os::unix::fs::chown(path, Some(uid), Some(gid))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
}

/// Create writable mount sources and hand them to the runtime identity.
///
/// Fixed identities get ownership and 0755; inherited identities are never
/// chowned and get 0777 instead.
pub fn provision_mounts(config: &RunConfig, fs: &dyn HostFs) -> Result<(), DeployError> {
    for volume in config.volumes.iter().filter(|v| !v.read_only) {
        let path = &volume.source;
        let fail = |e: std::io::Error| DeployError::ProvisionFailed {
            path: path.clone(),
            reason: e.to_string(),
        };

        fs.create_dir_all(path).map_err(fail)?;
        match config.identity {
            IdentityPolicy::Fixed { uid, gid } => {
                fs.chown(path, uid, gid).map_err(fail)?;
                fs.set_mode(path, FIXED_MODE).map_err(fail)?;
            }
            IdentityPolicy::Inherit => {
                fs.set_mode(path, INHERIT_MODE).map_err(fail)?;
            }
        }
        tracing::debug!(path = %path.display(), identity = %config.identity, "mount provisioned");
    }
    Ok(())
}

/// Container `user` for the policy; `None` when the invoking identity is unknown,
/// which [`deploy`] refuses for the inherit strategy.
pub fn container_user(policy: &IdentityPolicy, invoking: Option<(u32, u32)>) -> Option<String> {
    match policy {
        IdentityPolicy::Fixed { uid, gid } => Some(format!("{}:{}", uid, gid)),
        IdentityPolicy::Inherit => invoking.map(|(uid, gid)| format!("{}:{}", uid, gid)),
    }
}

/// Engine create request for the long-running instance.
pub fn container_config(
    config: &RunConfig,
    image: &ImageRef,
    env: std::collections::BTreeMap<String, String>,
    invoking: Option<(u32, u32)>,
) -> ContainerConfig {
    let mut env = env;
    if config.identity == IdentityPolicy::Inherit {
        env.entry("HOME".to_string())
            .or_insert_with(|| "/tmp".to_string());
    }

    let mut volumes: Vec<VolumeMount> = config
        .volumes
        .iter()
        .map(|v| VolumeMount {
            source: v.source.display().to_string(),
            target: v.target.clone(),
            read_only: v.read_only,
        })
        .collect();
    if let Some(target) = &config.secrets_target {
        volumes.push(VolumeMount {
            source: config.secrets_path().display().to_string(),
            target: target.clone(),
            read_only: true,
        });
    }

    let mut labels = HashMap::new();
    labels.insert(labels::MANAGED.to_string(), "true".to_string());
    labels.insert(labels::CONTAINER.to_string(), config.container.to_string());

    ContainerConfig {
        name: config.container.to_string(),
        image: image.clone(),
        env,
        labels,
        ports: vec![PortMapping {
            host_port: config.port.host,
            container_port: config.port.container,
        }],
        volumes,
        command: None,
        entrypoint: None,
        user: container_user(&config.identity, invoking),
        restart_policy: config.restart,
        stop_timeout: Some(config.stop_timeout),
    }
}

/// Provision mounts, record the identity strategy, retire the previous
/// holder of the name, then create and start.
pub async fn deploy<R: ContainerOps>(
    runtime: &R,
    config: &RunConfig,
    image: &ImageRef,
    fs: &dyn HostFs,
    invoking: Option<(u32, u32)>,
    diag: &mut Diagnostics,
) -> Result<ContainerHandle, DeployError> {
    let name = config.container.as_str();
    if config.identity == IdentityPolicy::Inherit && invoking.is_none() {
        return Err(DeployError::InvokingIdentityUnknown);
    }
    let env = crate::config::resolve_env_map(&config.env)
        .map_err(|e| DeployError::ContainerCreateFailed(e.to_string()))?;

    provision_mounts(config, fs)?;
    if let Err(e) = IdentityRecord::new(&config.identity, name).store(&config.config_dir) {
        diag.warn(Warning::identity_marker(format!(
            "failed to record identity strategy: {}",
            e
        )));
    }

    retire_existing(runtime, name, config.stop_timeout)
        .await
        .into_result(name)?;

    let container = container_config(config, image, env, invoking);
    let id = runtime
        .create_container(&container)
        .await
        .map_err(|e| DeployError::ContainerCreateFailed(e.to_string()))?;

    if let Err(e) = runtime.start_container(&id).await {
        if let Err(cleanup) = runtime.remove_container(&id, true).await {
            tracing::warn!(container = %name, "failed to remove unstarted container: {}", cleanup);
        }
        return Err(DeployError::ContainerStartFailed(e.to_string()));
    }

    tracing::info!(container = %name, id = %id.short(), "container started");

    Ok(ContainerHandle {
        name: name.to_string(),
        id,
    })
}

/// Paths that provisioning will touch, for reporting.
pub fn writable_mount_sources(config: &RunConfig) -> Vec<PathBuf> {
    config
        .volumes
        .iter()
        .filter(|v| !v.read_only)
        .map(|v| v.source.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_follows_identity_policy() {
        let fixed = IdentityPolicy::Fixed { uid: 10, gid: 20 };
        assert_eq!(container_user(&fixed, Some((1, 1))), Some("10:20".to_string()));
        assert_eq!(
            container_user(&IdentityPolicy::Inherit, Some((501, 20))),
            Some("501:20".to_string())
        );
        assert_eq!(container_user(&IdentityPolicy::Inherit, None), None);
    }

    #[test]
    fn local_fs_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        LocalFs.create_dir_all(&path).unwrap();
        LocalFs.set_mode(&path, 0o777).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
