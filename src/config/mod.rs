// ABOUTME: Run configuration loaded from shipit.yml.
// ABOUTME: Parses YAML, resolves relative paths and validates before any run starts.

mod build;
mod deserialize;
mod env_value;
mod health;
mod identity;
mod init;
mod mounts;
mod preflight;
mod restart_policy;

pub use build::{BuildSettings, ProbeCheck, VerificationProbe};
pub use env_value::{EnvValue, resolve_env_map};
pub use health::HealthSettings;
pub use identity::{IdentityPolicy, invoking_identity};
pub use init::init_config;
pub use mounts::{PublishedPort, VolumeSpec};
pub use preflight::{ByteSize, CleanupSettings, PreflightSettings};
pub use restart_policy::RestartPolicy;

use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use crate::types::{ContainerName, ImageRef};
use deserialize::{deserialize_container_name, deserialize_image_ref};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "shipit.yml";
pub const CONFIG_FILENAME_ALT: &str = "shipit.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".shipit/config.yml";

/// Immutable input to one deployment run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    #[serde(deserialize_with = "deserialize_container_name")]
    pub container: ContainerName,

    /// Host directory holding the secrets file.
    pub config_dir: PathBuf,

    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,

    /// When set, the secrets file is bind-mounted read-only at this path.
    #[serde(default)]
    pub secrets_target: Option<String>,

    pub port: PublishedPort,

    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Keys that must be assigned in the secrets file.
    #[serde(default = "default_required_keys")]
    pub required_keys: Vec<String>,

    /// Paths that must exist inside the build context.
    #[serde(default = "default_required_paths")]
    pub required_paths: Vec<PathBuf>,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub identity: IdentityPolicy,

    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub preflight: PreflightSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub cleanup: CleanupSettings,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_secrets_file() -> String {
    ".env".to_string()
}

fn default_required_keys() -> Vec<String> {
    ["ANGEL_API_KEY", "ANGEL_CLIENT_ID", "ANGEL_MPIN", "ANGEL_TOTP_SECRET"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_required_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("src/tools.py")]
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

impl RunConfig {
    /// Parse and validate. Relative paths are kept as written.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, resolving relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolve_paths(base))
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        let path = candidates
            .iter()
            .find(|path| path.exists())
            .ok_or_else(|| Error::ConfigNotFound(dir.to_path_buf()))?;

        // Relative paths are relative to the project directory, even for
        // a config kept under .shipit/.
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?.resolve_paths(dir))
    }

    /// Make the build context, config dir and mount sources absolute.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let absolute = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        self.build.context = absolute(&self.build.context);
        self.config_dir = absolute(&self.config_dir);
        for volume in &mut self.volumes {
            volume.source = absolute(&volume.source);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.health.max_attempts == 0 {
            return invalid("health.max_attempts must be at least 1".to_string());
        }

        if self.secrets_file.is_empty() || self.secrets_file.contains('/') {
            return invalid(format!(
                "secrets_file must be a file name inside config_dir: {}",
                self.secrets_file
            ));
        }

        if let Some(target) = &self.secrets_target
            && !target.starts_with('/')
        {
            return invalid(format!("secrets_target must be absolute: {}", target));
        }

        if let Some(key) = self
            .required_keys
            .iter()
            .find(|k| k.is_empty() || k.contains('='))
        {
            return invalid(format!("invalid required key: '{}'", key));
        }

        let mut targets: Vec<&str> = self.volumes.iter().map(|v| v.target.as_str()).collect();
        targets.extend(self.secrets_target.as_deref());
        targets.sort_unstable();
        if let Some(pair) = targets.windows(2).find(|w| w[0] == w[1]) {
            return invalid(format!("mount target used twice: {}", pair[0]));
        }

        let mut names = std::collections::HashSet::new();
        for probe in &self.build.probes {
            probe.validate().map_err(Error::InvalidConfig)?;
            if !names.insert(probe.name.as_str()) {
                return invalid(format!("duplicate verification probe: {}", probe.name));
            }
        }

        Ok(())
    }

    /// Host path of the secrets file.
    pub fn secrets_path(&self) -> PathBuf {
        self.config_dir.join(&self.secrets_file)
    }

    /// URL probed by the health verifier.
    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port.host, self.health.path)
    }

    /// Address operators use to reach the service.
    pub fn access_point(&self) -> String {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        format!("http://{}:{}", host, self.port.host)
    }

    pub fn template() -> Result<Self> {
        let image =
            ImageRef::parse("optitrade:latest").map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let container =
            ContainerName::new("optitrade").map_err(|e| Error::InvalidConfig(e.to_string()))?;

        Ok(RunConfig {
            image,
            container,
            config_dir: PathBuf::from("/opt/optitrade/config"),
            secrets_file: default_secrets_file(),
            secrets_target: Some("/app/.env".to_string()),
            port: PublishedPort {
                host: 8501,
                container: 8501,
            },
            volumes: vec![
                VolumeSpec {
                    source: PathBuf::from("/opt/optitrade/output"),
                    target: "/app/output".to_string(),
                    read_only: false,
                },
                VolumeSpec {
                    source: PathBuf::from("/opt/optitrade/logs"),
                    target: "/app/logs".to_string(),
                    read_only: false,
                },
            ],
            env: BTreeMap::new(),
            required_keys: default_required_keys(),
            required_paths: default_required_paths(),
            restart: RestartPolicy::default(),
            identity: IdentityPolicy::default(),
            stop_timeout: default_stop_timeout(),
            build: BuildSettings::default(),
            preflight: PreflightSettings::default(),
            health: HealthSettings::default(),
            cleanup: CleanupSettings::default(),
            runtime: RuntimeConfig::default(),
        })
    }
}
