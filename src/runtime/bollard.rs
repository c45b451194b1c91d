// ABOUTME: Bollard-based container engine implementation.
// ABOUTME: Talks to Docker or Podman over the Docker-compatible socket API.

use crate::config::RestartPolicy as RestartSetting;
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    BuildOutput, BuildRequest, ContainerConfig, ContainerError, ContainerFilters, ContainerInfo,
    ContainerOps, ContainerState, ContainerSummary, ImageError, ImageOps, LogError, LogLine,
    LogLineStream, LogOps, LogOptions, LogStream, PruneReport, RuntimeInfo, RuntimeInfoError,
    RuntimeMetadata,
};
use crate::runtime::types::{DetectedRuntime, RuntimeType};
use crate::types::{ContainerId, ImageId};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, HostConfig, Mount, MountTypeEnum, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    BuildImageOptions, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    LogsOptions, PruneBuildOptions, PruneImagesOptions, RemoveContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{Either, Full};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::ImageNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::AlreadyExists(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 400 => ContainerError::InvalidConfig(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::AlreadyRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::NotRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn restart_policy(setting: &RestartSetting) -> RestartPolicy {
    match setting {
        RestartSetting::No => RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            maximum_retry_count: None,
        },
        RestartSetting::UnlessStopped => RestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        },
        RestartSetting::OnFailure { max_retries } => RestartPolicy {
            name: Some(RestartPolicyNameEnum::ON_FAILURE),
            maximum_retry_count: max_retries.map(i64::from),
        },
    }
}

/// Keep only the last `limit` entries.
fn push_bounded(buf: &mut VecDeque<String>, line: &str, limit: usize) {
    for l in line.lines().filter(|l| !l.trim().is_empty()) {
        if buf.len() == limit.max(1) {
            buf.pop_front();
        }
        buf.push_back(l.to_string());
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Engine client for a local Docker or Podman socket.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to the engine behind a detected socket.
    pub fn connect(detected: &DetectedRuntime) -> Result<Self, RuntimeInfoError> {
        let client =
            Docker::connect_with_unix(&detected.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client, detected.runtime_type))
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    async fn resolve_image_id(&self, tag: &str) -> Result<ImageId, ImageError> {
        let inspect = self
            .client
            .inspect_image(tag)
            .await
            .map_err(|e| ImageError::Runtime(format!("failed to inspect {}: {}", tag, e)))?;
        inspect
            .id
            .map(ImageId::new)
            .ok_or_else(|| ImageError::NotFound(tag.to_string()))
    }
}

impl Sealed for BollardRuntime {}

#[async_trait]
impl RuntimeInfo for BollardRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        let info = self
            .client
            .info()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;

        Ok(RuntimeMetadata {
            name: self.runtime_type.to_string(),
            version: info.server_version.unwrap_or_default(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: info.operating_system.unwrap_or_default(),
            arch: info.architecture.unwrap_or_default(),
            root_dir: info.docker_root_dir.filter(|d| !d.is_empty()).map(PathBuf::from),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.client
            .ping()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput, ImageError> {
        let tag = request.tag.to_string();
        let options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: Some(tag.clone()),
            nocache: request.no_cache,
            rm: true,
            ..Default::default()
        };

        let body = Either::Left(Full::new(Bytes::from(request.context.clone())));
        let mut build_stream = self.client.build_image(options, None, Some(body));

        let mut log = VecDeque::new();
        let mut image_id = None;

        while let Some(result) = build_stream.next().await {
            match result {
                Ok(output) => {
                    if let Some(line) = output.stream.as_deref() {
                        tracing::debug!(target: "shipit::build", "{}", line.trim_end());
                        push_bounded(&mut log, line, request.log_tail);
                    }
                    if let Some(detail) = output.error_detail {
                        let message = detail
                            .message
                            .unwrap_or_else(|| "unknown build error".to_string());
                        push_bounded(&mut log, &message, request.log_tail);
                        return Err(ImageError::BuildFailed {
                            message,
                            log_tail: log.into(),
                        });
                    }
                    if let Some(id) = output.aux.and_then(|aux| aux.id) {
                        image_id = Some(ImageId::new(id));
                    }
                }
                Err(bollard::errors::Error::DockerStreamError { error }) => {
                    push_bounded(&mut log, &error, request.log_tail);
                    return Err(ImageError::BuildFailed {
                        message: error,
                        log_tail: log.into(),
                    });
                }
                Err(e) => {
                    return Err(ImageError::BuildFailed {
                        message: e.to_string(),
                        log_tail: log.into(),
                    });
                }
            }
        }

        let image_id = match image_id {
            Some(id) => id,
            None => self.resolve_image_id(&tag).await?,
        };

        Ok(BuildOutput {
            image_id,
            log: log.into(),
        })
    }

    async fn prune_dangling_images(&self) -> Result<PruneReport, ImageError> {
        let mut filters = HashMap::new();
        filters.insert("dangling".to_string(), vec!["true".to_string()]);

        let response = self
            .client
            .prune_images(Some(PruneImagesOptions {
                filters: Some(filters),
            }))
            .await
            .map_err(|e| ImageError::Runtime(format!("image prune failed: {}", e)))?;

        Ok(PruneReport {
            deleted: response.images_deleted.map(|d| d.len()).unwrap_or(0),
            space_reclaimed: response
                .space_reclaimed
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
        })
    }

    async fn prune_build_cache(&self) -> Result<PruneReport, ImageError> {
        let response = self
            .client
            .prune_build(None::<PruneBuildOptions>)
            .await
            .map_err(|e| ImageError::Runtime(format!("build cache prune failed: {}", e)))?;

        Ok(PruneReport {
            deleted: response.caches_deleted.map(|d| d.len()).unwrap_or(0),
            space_reclaimed: response
                .space_reclaimed
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
        })
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mounts: Vec<Mount> = config
            .volumes
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: Vec<String> = Vec::new();
        for port in &config.ports {
            let port_key = format!("{}/tcp", port.container_port);
            exposed_ports.push(port_key.clone());
            port_bindings.insert(
                port_key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(port.host_port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            restart_policy: Some(restart_policy(&config.restart_policy)),
            mounts: (!mounts.is_empty()).then_some(mounts),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            ..Default::default()
        };

        let container_config = ContainerCreateBody {
            image: Some(config.image.to_string()),
            env: (!env.is_empty()).then_some(env),
            labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
            cmd: config.command.clone(),
            entrypoint: config.entrypoint.clone(),
            user: config.user.clone(),
            host_config: Some(host_config),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            stop_timeout: config.stop_timeout.map(|d| d.as_secs() as i64),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), container_config)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        let opts = WaitContainerOptions {
            condition: "not-running".to_string(),
        };
        let mut stream = self.client.wait_container(id.as_str(), Some(opts));

        let mut status = 0;
        while let Some(result) = stream.next().await {
            match result {
                Ok(response) => status = response.status_code,
                // Non-zero exits surface as an error carrying the code.
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    return Ok(code);
                }
                Err(e) => return Err(map_container_not_found_error(e)),
            }
        }
        Ok(status)
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| match s {
                bollard::models::ContainerStateStatusEnum::CREATED => ContainerState::Created,
                bollard::models::ContainerStateStatusEnum::RUNNING => ContainerState::Running,
                bollard::models::ContainerStateStatusEnum::PAUSED => ContainerState::Paused,
                bollard::models::ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
                bollard::models::ContainerStateStatusEnum::REMOVING => ContainerState::Removing,
                bollard::models::ContainerStateStatusEnum::EXITED => ContainerState::Exited,
                bollard::models::ContainerStateStatusEnum::DEAD => ContainerState::Dead,
                _ => ContainerState::Exited,
            })
            .unwrap_or(ContainerState::Exited);

        let exit_code = details.state.as_ref().and_then(|s| s.exit_code);

        Ok(ContainerInfo {
            id: ContainerId::new(details.id.unwrap_or_else(|| name_or_id.to_string())),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            state,
            exit_code,
            user: details
                .config
                .as_ref()
                .and_then(|c| c.user.clone())
                .filter(|u| !u.is_empty()),
            created: details.created.map(|dt| dt.to_string()).unwrap_or_default(),
            labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(ref name) = filters.name {
            filter_map.insert("name".to_string(), vec![name.clone()]);
        }

        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{}={}", key, value));
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        // Podman reports "stopping" during shutdown, which bollard cannot
        // deserialize. The state is transient, so retry briefly.
        let mut last_error = None;
        for attempt in 0..3 {
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => {
                    return Ok(containers
                        .into_iter()
                        .map(|c| {
                            let name = c
                                .names
                                .unwrap_or_default()
                                .first()
                                .map(|n| n.trim_start_matches('/').to_string())
                                .unwrap_or_default();

                            ContainerSummary {
                                id: ContainerId::new(c.id.unwrap_or_default()),
                                name,
                                image: c.image.unwrap_or_default(),
                                state: c
                                    .state
                                    .map(|s| format!("{:?}", s).to_lowercase())
                                    .unwrap_or_default(),
                                status: c.status.unwrap_or_default(),
                                labels: c.labels.unwrap_or_default(),
                            }
                        })
                        .collect());
                }
                Err(e) => {
                    let err_str = e.to_string();
                    if (err_str.contains("unknown variant `stopping`")
                        || err_str.contains("unknown variant `stopped`"))
                        && attempt < 2
                    {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        last_error = Some(err_str);
                        continue;
                    }
                    return Err(ContainerError::Runtime(err_str));
                }
            }
        }

        Err(ContainerError::Runtime(
            last_error.unwrap_or_else(|| "list_containers failed".to_string()),
        ))
    }
}

#[async_trait]
impl LogOps for BollardRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogLineStream, LogError> {
        let log_opts = LogsOptions {
            stdout: opts.stdout,
            stderr: opts.stderr,
            follow: opts.follow,
            timestamps: opts.timestamps,
            tail: opts
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let stream = self.client.logs(id.as_str(), Some(log_opts));

        let mapped_stream = stream.map(|result| {
            result
                .map(|output| {
                    let (stream, data) = match output {
                        bollard::container::LogOutput::StdErr { message } => {
                            (LogStream::Stderr, message)
                        }
                        bollard::container::LogOutput::StdOut { message }
                        | bollard::container::LogOutput::StdIn { message }
                        | bollard::container::LogOutput::Console { message } => {
                            (LogStream::Stdout, message)
                        }
                    };

                    LogLine {
                        content: String::from_utf8_lossy(&data).to_string(),
                        stream,
                    }
                })
                .map_err(|e| match e {
                    bollard::errors::Error::DockerResponseServerError {
                        status_code: 404,
                        message,
                    } => LogError::ContainerNotFound(message),
                    other => LogError::StreamError(other.to_string()),
                })
        });

        Ok(Box::pin(mapped_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_bounded_keeps_tail() {
        let mut buf = VecDeque::new();
        for i in 0..10 {
            push_bounded(&mut buf, &format!("line {}\n", i), 3);
        }
        assert_eq!(
            Vec::from(buf),
            vec!["line 7".to_string(), "line 8".to_string(), "line 9".to_string()]
        );
    }

    #[test]
    fn restart_policy_maps_retries() {
        let policy = restart_policy(&RestartSetting::OnFailure {
            max_retries: Some(3),
        });
        assert_eq!(policy.name, Some(RestartPolicyNameEnum::ON_FAILURE));
        assert_eq!(policy.maximum_retry_count, Some(3));

        let policy = restart_policy(&RestartSetting::UnlessStopped);
        assert_eq!(policy.name, Some(RestartPolicyNameEnum::UNLESS_STOPPED));
    }
}
