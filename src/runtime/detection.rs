// ABOUTME: Local container engine detection.
// ABOUTME: Checks Podman sockets first, then Docker, unless the config pins one.

use super::types::{DetectedRuntime, RuntimeConfig, RuntimeType};
use std::path::Path;

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("configured socket does not exist: {0}")]
    SocketMissing(String),
}

/// Resolve the engine endpoint on this host.
///
/// An explicit `runtime.type` in the config wins. Otherwise sockets are
/// probed in this order:
/// 1. Rootless Podman (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman (`/run/podman/podman.sock`)
/// 3. Docker (`/var/run/docker.sock`)
pub fn detect_runtime(config: Option<&RuntimeConfig>) -> Result<DetectedRuntime, DetectionError> {
    if let Some(cfg) = config {
        if let Some(runtime_type) = cfg.runtime {
            let socket_path = cfg
                .socket
                .clone()
                .unwrap_or_else(|| default_socket_path(runtime_type));
            return Ok(DetectedRuntime {
                runtime_type,
                socket_path,
            });
        }

        if let Some(socket) = &cfg.socket {
            if !Path::new(socket).exists() {
                return Err(DetectionError::SocketMissing(socket.clone()));
            }
            let runtime_type = if socket.contains("podman") {
                RuntimeType::Podman
            } else {
                RuntimeType::Docker
            };
            return Ok(DetectedRuntime {
                runtime_type,
                socket_path: socket.clone(),
            });
        }
    }

    detect_local()
}

/// Probe the well-known socket locations.
pub fn detect_local() -> Result<DetectedRuntime, DetectionError> {
    let uid = get_uid();
    let rootless_socket = format!("/run/user/{}/podman/podman.sock", uid);
    if Path::new(&rootless_socket).exists() {
        return Ok(DetectedRuntime {
            runtime_type: RuntimeType::Podman,
            socket_path: rootless_socket,
        });
    }

    if Path::new(ROOTFUL_PODMAN).exists() {
        return Ok(DetectedRuntime {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN.to_string(),
        });
    }

    if Path::new(DOCKER_SOCKET).exists() {
        return Ok(DetectedRuntime {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound)
}

fn get_uid() -> String {
    std::env::var("UID").unwrap_or_else(|_| crate::config::invoking_identity().0.to_string())
}

fn default_socket_path(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET.to_string(),
        RuntimeType::Podman => ROOTFUL_PODMAN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_type_wins_over_probing() {
        let cfg = RuntimeConfig {
            runtime: Some(RuntimeType::Podman),
            socket: None,
        };
        let detected = detect_runtime(Some(&cfg)).unwrap();
        assert_eq!(detected.runtime_type, RuntimeType::Podman);
        assert_eq!(detected.socket_path, ROOTFUL_PODMAN);
    }

    #[test]
    fn explicit_socket_must_exist() {
        let cfg = RuntimeConfig {
            runtime: None,
            socket: Some("/nonexistent/shipit-test.sock".to_string()),
        };
        assert!(matches!(
            detect_runtime(Some(&cfg)),
            Err(DetectionError::SocketMissing(_))
        ));
    }
}
