// ABOUTME: In-memory container engine for tests and dry runs.
// ABOUTME: Records every operation and lets callers script failures and exit codes.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    BuildOutput, BuildRequest, ContainerConfig, ContainerError, ContainerFilters, ContainerInfo,
    ContainerOps, ContainerState, ContainerSummary, ImageError, ImageOps, LogError, LogLine,
    LogLineStream, LogOps, LogOptions, LogStream, PruneReport, RuntimeInfo, RuntimeInfoError,
    RuntimeMetadata,
};
use crate::types::{ContainerId, ImageId, ImageRef};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Engine call observed by [`MemoryRuntime`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    Build { tag: String, no_cache: bool },
    Create { name: String },
    Start { name: String },
    Stop { name: String },
    Wait { name: String },
    Remove { name: String },
    PruneImages,
    PruneBuildCache,
}

#[derive(Debug, Clone)]
struct StoredContainer {
    id: ContainerId,
    config: ContainerConfig,
    state: ContainerState,
    exit_code: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    containers: Vec<StoredContainer>,
    images: HashMap<String, ImageId>,
    ops: Vec<RecordedOp>,
    next_id: u64,
    dangling: usize,
    build_cache: usize,
    build_failure: Option<(String, Vec<String>)>,
    exits: HashMap<String, (i64, Vec<String>)>,
    logs: HashMap<String, Vec<String>>,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    fail_remove: HashSet<String>,
    fail_prune: bool,
    fail_cache_prune: bool,
    unreachable: bool,
    root_dir: Option<PathBuf>,
}

impl State {
    fn next_hex(&mut self) -> String {
        self.next_id += 1;
        format!("{:064x}", self.next_id)
    }

    /// Engine lookup order: full id, exact name, then unique id prefix.
    fn position(&self, name_or_id: &str) -> Option<usize> {
        let containers = &self.containers;
        if let Some(i) = containers.iter().position(|c| c.id.as_str() == name_or_id) {
            return Some(i);
        }
        if let Some(i) = containers.iter().position(|c| c.config.name == name_or_id) {
            return Some(i);
        }
        if name_or_id.is_empty() {
            return None;
        }
        let mut prefixed = containers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.id.as_str().starts_with(name_or_id))
            .map(|(i, _)| i);
        match (prefixed.next(), prefixed.next()) {
            (Some(i), None) => Some(i),
            _ => None,
        }
    }

    fn find(&self, name_or_id: &str) -> Option<&StoredContainer> {
        self.position(name_or_id).map(|i| &self.containers[i])
    }

    fn find_mut(&mut self, name_or_id: &str) -> Option<&mut StoredContainer> {
        self.position(name_or_id).map(|i| &mut self.containers[i])
    }
}

/// Engine double backed by a mutex-guarded map.
///
/// Containers succeed by default: builds tag a fresh image id, probe
/// containers exit 0 and every call is appended to [`MemoryRuntime::ops`].
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<State>,
}

impl MemoryRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage root reported by `info()`.
    pub fn with_root_dir(self, root: impl Into<PathBuf>) -> Self {
        self.state.lock().root_dir = Some(root.into());
        self
    }

    /// Register an existing container, as left behind by an earlier run.
    pub fn seed_container(&self, name: &str, image: &ImageRef, running: bool) -> ContainerId {
        let mut state = self.state.lock();
        let id = ContainerId::new(state.next_hex());
        let image_id = ImageId::new(format!("sha256:{}", state.next_hex()));
        state.images.insert(image.to_string(), image_id);
        state.containers.push(StoredContainer {
            id: id.clone(),
            config: ContainerConfig::new(name, image.clone()),
            state: if running {
                ContainerState::Running
            } else {
                ContainerState::Exited
            },
            exit_code: None,
        });
        id
    }

    /// Make the next build fail with `message` and trailing `log` lines.
    pub fn fail_build(&self, message: &str, log: &[&str]) {
        self.state.lock().build_failure = Some((
            message.to_string(),
            log.iter().map(|l| l.to_string()).collect(),
        ));
    }

    /// Exit code and output the named container produces when waited on.
    pub fn script_exit(&self, name: &str, code: i64, output: &[&str]) {
        self.state.lock().exits.insert(
            name.to_string(),
            (code, output.iter().map(|l| l.to_string()).collect()),
        );
    }

    pub fn set_logs(&self, name: &str, lines: &[&str]) {
        self.state
            .lock()
            .logs
            .insert(name.to_string(), lines.iter().map(|l| l.to_string()).collect());
    }

    pub fn fail_create(&self, name: &str) {
        self.state.lock().fail_create.insert(name.to_string());
    }

    pub fn fail_start(&self, name: &str) {
        self.state.lock().fail_start.insert(name.to_string());
    }

    pub fn fail_remove(&self, name: &str) {
        self.state.lock().fail_remove.insert(name.to_string());
    }

    pub fn fail_prune(&self) {
        self.state.lock().fail_prune = true;
    }

    pub fn fail_cache_prune(&self) {
        self.state.lock().fail_cache_prune = true;
    }

    /// Every call fails as if the socket were gone.
    pub fn set_unreachable(&self) {
        self.state.lock().unreachable = true;
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.state.lock().ops.clone()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state
            .lock()
            .containers
            .iter()
            .map(|c| c.config.name.clone())
            .collect()
    }

    /// Config the named container was created with.
    pub fn container_config(&self, name: &str) -> Option<ContainerConfig> {
        self.state.lock().find(name).map(|c| c.config.clone())
    }

    pub fn container_state(&self, name: &str) -> Option<ContainerState> {
        self.state.lock().find(name).map(|c| c.state)
    }

    fn check_reachable(&self) -> Result<(), String> {
        if self.state.lock().unreachable {
            Err("memory runtime marked unreachable".to_string())
        } else {
            Ok(())
        }
    }
}

impl Sealed for MemoryRuntime {}

#[async_trait]
impl RuntimeInfo for MemoryRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        self.check_reachable()
            .map_err(RuntimeInfoError::ConnectionFailed)?;
        Ok(RuntimeMetadata {
            name: "memory".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: "none".to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            root_dir: self.state.lock().root_dir.clone(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.check_reachable()
            .map_err(RuntimeInfoError::ConnectionFailed)
    }
}

#[async_trait]
impl ImageOps for MemoryRuntime {
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput, ImageError> {
        self.check_reachable().map_err(ImageError::Runtime)?;
        let mut state = self.state.lock();
        let tag = request.tag.to_string();
        state.ops.push(RecordedOp::Build {
            tag: tag.clone(),
            no_cache: request.no_cache,
        });

        if let Some((message, log)) = state.build_failure.take() {
            let skip = log.len().saturating_sub(request.log_tail);
            return Err(ImageError::BuildFailed {
                message,
                log_tail: log.into_iter().skip(skip).collect(),
            });
        }

        state.build_cache += 1;
        let image_id = ImageId::new(format!("sha256:{}", state.next_hex()));
        if state.images.insert(tag.clone(), image_id.clone()).is_some() {
            state.dangling += 1;
        }

        Ok(BuildOutput {
            image_id,
            log: vec![format!("Successfully tagged {}", tag)],
        })
    }

    async fn prune_dangling_images(&self) -> Result<PruneReport, ImageError> {
        self.check_reachable().map_err(ImageError::Runtime)?;
        let mut state = self.state.lock();
        state.ops.push(RecordedOp::PruneImages);
        if state.fail_prune {
            return Err(ImageError::Runtime("prune refused".to_string()));
        }
        let deleted = std::mem::take(&mut state.dangling);
        Ok(PruneReport {
            deleted,
            space_reclaimed: deleted as u64 * 1024 * 1024,
        })
    }

    async fn prune_build_cache(&self) -> Result<PruneReport, ImageError> {
        self.check_reachable().map_err(ImageError::Runtime)?;
        let mut state = self.state.lock();
        state.ops.push(RecordedOp::PruneBuildCache);
        if state.fail_cache_prune {
            return Err(ImageError::Runtime("builder is busy".to_string()));
        }
        let deleted = std::mem::take(&mut state.build_cache);
        Ok(PruneReport {
            deleted,
            space_reclaimed: deleted as u64 * 4096,
        })
    }
}

#[async_trait]
impl ContainerOps for MemoryRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        self.check_reachable().map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        state.ops.push(RecordedOp::Create {
            name: config.name.clone(),
        });

        if state.fail_create.contains(&config.name) {
            return Err(ContainerError::InvalidConfig(format!(
                "create refused for {}",
                config.name
            )));
        }
        if state.containers.iter().any(|c| c.config.name == config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }
        if !state.images.contains_key(&config.image.to_string()) {
            return Err(ContainerError::ImageNotFound(config.image.to_string()));
        }

        let id = ContainerId::new(state.next_hex());
        state.containers.push(StoredContainer {
            id: id.clone(),
            config: config.clone(),
            state: ContainerState::Created,
            exit_code: None,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.check_reachable().map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        let name = state
            .find(id.as_str())
            .map(|c| c.config.name.clone())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        state.ops.push(RecordedOp::Start { name: name.clone() });

        if state.fail_start.contains(&name) {
            return Err(ContainerError::Runtime(format!(
                "port is already allocated for {}",
                name
            )));
        }

        let container = state
            .find_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if container.state == ContainerState::Running {
            return Err(ContainerError::AlreadyRunning(name));
        }
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        self.check_reachable().map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        let container = state
            .find_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        let name = container.config.name.clone();
        if container.state != ContainerState::Running {
            return Err(ContainerError::NotRunning(name));
        }
        container.state = ContainerState::Exited;
        state.ops.push(RecordedOp::Stop { name });
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        self.check_reachable().map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        let (name, running) = state
            .find(id.as_str())
            .map(|c| (c.config.name.clone(), c.state == ContainerState::Running))
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        state.ops.push(RecordedOp::Remove { name: name.clone() });

        if state.fail_remove.contains(&name) {
            return Err(ContainerError::Runtime(format!(
                "removal of container {} is already in progress",
                name
            )));
        }
        if running && !force {
            return Err(ContainerError::Runtime(format!(
                "cannot remove running container {}",
                name
            )));
        }

        state.containers.retain(|c| c.config.name != name);
        Ok(())
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        self.check_reachable().map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        let name = state
            .find(id.as_str())
            .map(|c| c.config.name.clone())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        state.ops.push(RecordedOp::Wait { name: name.clone() });

        let code = state.exits.get(&name).map(|(code, _)| *code).unwrap_or(0);
        if let Some(container) = state.find_mut(&name) {
            container.state = ContainerState::Exited;
            container.exit_code = Some(code);
        }
        Ok(code)
    }

    async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerInfo, ContainerError> {
        self.check_reachable().map_err(ContainerError::Runtime)?;
        let state = self.state.lock();
        let c = state
            .find(name_or_id)
            .ok_or_else(|| ContainerError::NotFound(name_or_id.to_string()))?;
        Ok(ContainerInfo {
            id: c.id.clone(),
            name: c.config.name.clone(),
            image: c.config.image.to_string(),
            state: c.state,
            exit_code: c.exit_code,
            user: c.config.user.clone(),
            created: String::new(),
            labels: c.config.labels.clone(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        self.check_reachable().map_err(ContainerError::Runtime)?;
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|c| filters.all || c.state == ContainerState::Running)
            .filter(|c| {
                filters
                    .name
                    .as_deref()
                    .is_none_or(|n| c.config.name.contains(n))
            })
            .filter(|c| {
                filters
                    .labels
                    .iter()
                    .all(|(k, v)| c.config.labels.get(k) == Some(v))
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.config.name.clone(),
                image: c.config.image.to_string(),
                state: c.state.to_string(),
                status: c.state.to_string(),
                labels: c.config.labels.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl LogOps for MemoryRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogLineStream, LogError> {
        self.check_reachable().map_err(LogError::Runtime)?;
        let state = self.state.lock();
        let name = state
            .find(id.as_str())
            .map(|c| c.config.name.clone())
            .ok_or_else(|| LogError::ContainerNotFound(id.to_string()))?;

        let lines = state
            .exits
            .get(&name)
            .map(|(_, out)| out.clone())
            .or_else(|| state.logs.get(&name).cloned())
            .unwrap_or_default();
        let skip = match opts.tail {
            Some(n) => lines.len().saturating_sub(n as usize),
            None => 0,
        };

        let items: Vec<Result<LogLine, LogError>> = lines
            .into_iter()
            .skip(skip)
            .map(|content| {
                Ok(LogLine {
                    content: format!("{}\n", content),
                    stream: LogStream::Stdout,
                })
            })
            .collect();

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageRef {
        ImageRef::parse("app:latest").unwrap()
    }

    fn request(no_cache: bool) -> BuildRequest {
        BuildRequest {
            context: Vec::new(),
            dockerfile: "Dockerfile".to_string(),
            tag: image(),
            no_cache,
            log_tail: 5,
        }
    }

    #[tokio::test]
    async fn rebuild_leaves_dangling_image_for_prune() {
        let rt = MemoryRuntime::new();
        rt.build_image(&request(true)).await.unwrap();
        rt.build_image(&request(true)).await.unwrap();

        let report = rt.prune_dangling_images().await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(rt.prune_dangling_images().await.unwrap().deleted, 0);
    }

    #[tokio::test]
    async fn scripted_exit_and_output() {
        let rt = MemoryRuntime::new();
        rt.build_image(&request(true)).await.unwrap();
        rt.script_exit("probe", 3, &["boom"]);

        let id = rt
            .create_container(&ContainerConfig::new("probe", image()))
            .await
            .unwrap();
        rt.start_container(&id).await.unwrap();
        assert_eq!(rt.wait_container(&id).await.unwrap(), 3);
        assert_eq!(rt.tail_logs(&id, 10).await.unwrap(), vec!["boom"]);
    }

    #[tokio::test]
    async fn running_container_needs_force_to_remove() {
        let rt = MemoryRuntime::new();
        let id = rt.seed_container("app", &image(), true);
        assert!(rt.remove_container(&id, false).await.is_err());
        rt.remove_container(&id, true).await.unwrap();
        assert!(rt.container_names().is_empty());
    }

    #[tokio::test]
    async fn create_requires_image() {
        let rt = MemoryRuntime::new();
        let err = rt
            .create_container(&ContainerConfig::new("app", image()))
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::ImageNotFound(_)));
    }

    #[tokio::test]
    async fn inspect_resolves_id_prefixes_like_the_engine() {
        let rt = MemoryRuntime::new();
        let id = rt.seed_container("db", &image(), true);

        let by_prefix = rt.inspect_container(&id.as_str()[..12]).await.unwrap();
        assert_eq!(by_prefix.name, "db");
        assert!(rt.inspect_container("cafe").await.is_err());
    }

    #[tokio::test]
    async fn build_cache_is_pruned_separately() {
        let rt = MemoryRuntime::new();
        rt.build_image(&request(false)).await.unwrap();

        assert_eq!(rt.prune_build_cache().await.unwrap().deleted, 1);
        assert_eq!(rt.prune_dangling_images().await.unwrap().deleted, 0);
        assert_eq!(rt.ops().last(), Some(&RecordedOp::PruneImages));
    }
}
