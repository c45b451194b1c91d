// ABOUTME: Shared fixtures for pipeline integration tests.
// ABOUTME: Temp project layout, scripted host probes and a recording filesystem.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use shipit::config::RunConfig;
use shipit::deploy::{
    CapacityError, CapacityProbe, HealthProbe, HealthProbeError, HostFs, PipelineDeps,
    StorageUsage,
};
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("shipit=debug")
            .with_test_writer()
            .init();
    });
}

pub const ALL_KEYS: &str = "ANGEL_API_KEY=key\n\
ANGEL_CLIENT_ID=client\n\
ANGEL_MPIN=1234\n\
ANGEL_TOTP_SECRET=secret\n";

/// A source checkout plus host config directory in a temp dir.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    /// Complete layout: Dockerfile, src/tools.py and a secrets file with every key.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app/src")).unwrap();
        fs::write(root.join("app/Dockerfile"), "FROM python:3.12-slim\n").unwrap();
        fs::write(
            root.join("app/src/tools.py"),
            "def find_nifty_expiry_dates(): pass\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/.env"), ALL_KEYS).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_secrets(&self, content: &str) {
        fs::write(self.root().join("config/.env"), content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.root().join(relative)).unwrap();
    }

    /// Config with zero delays; `extra` is appended verbatim.
    pub fn config(&self, extra: &str) -> RunConfig {
        let yaml = format!(
            r#"image: optitrade:latest
container: optitrade
config_dir: config
secrets_target: /app/.env
port: "8501:8501"
volumes:
  - "data/output:/app/output"
  - "data/logs:/app/logs"
preflight:
  docker_root: /var/lib/docker
health:
  settle_delay: 0s
  interval: 0s
  max_attempts: 3
  probe_timeout: 1s
{extra}"#
        );
        let mut config = RunConfig::from_yaml(&yaml)
            .unwrap()
            .resolve_paths(self.root());
        config.build.context = self.root().join("app");
        config
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("data/output")
    }
}

/// Capacity probe reporting a fixed amount of free space.
pub struct FixedCapacity {
    pub available: u64,
    pub fail: bool,
}

impl FixedCapacity {
    pub fn gib(n: u64) -> Self {
        Self {
            available: n * 1024 * 1024 * 1024,
            fail: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: 0,
            fail: true,
        }
    }
}

#[async_trait]
impl CapacityProbe for FixedCapacity {
    async fn usage(&self, _path: &Path) -> Result<StorageUsage, CapacityError> {
        if self.fail {
            return Err(CapacityError::Parse("df not available".to_string()));
        }
        Ok(StorageUsage {
            total: self.available * 4,
            used: self.available * 3,
            available: self.available,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsCall {
    CreateDir(PathBuf),
    Chown(PathBuf, u32, u32),
    SetMode(PathBuf, u32),
}

/// Filesystem double that records calls instead of touching the disk.
#[derive(Default)]
pub struct RecordingFs {
    calls: Mutex<Vec<FsCall>>,
}

impl RecordingFs {
    pub fn calls(&self) -> Vec<FsCall> {
        self.calls.lock().clone()
    }

    pub fn chowns(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, FsCall::Chown(..)))
            .count()
    }
}

impl HostFs for RecordingFs {
    fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        self.calls.lock().push(FsCall::CreateDir(path.to_path_buf()));
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
        self.calls
            .lock()
            .push(FsCall::Chown(path.to_path_buf(), uid, gid));
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        self.calls
            .lock()
            .push(FsCall::SetMode(path.to_path_buf(), mode));
        Ok(())
    }
}

/// Health probe answering from a script; the last entry repeats.
pub struct ScriptedHealth {
    script: Mutex<VecDeque<Result<u16, ()>>>,
    calls: AtomicU32,
}

impl ScriptedHealth {
    pub fn new(script: Vec<Result<u16, ()>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(vec![Ok(200)])
    }

    /// Healthy on attempt `k`, refused before.
    pub fn healthy_on(k: usize) -> Self {
        let mut script = vec![Err(()); k - 1];
        script.push(Ok(200));
        Self::new(script)
    }

    pub fn never() -> Self {
        Self::new(vec![Ok(503)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedHealth {
    async fn probe(&self) -> Result<u16, HealthProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };
        match next.unwrap_or(Ok(200)) {
            Ok(code) => Ok(code),
            Err(()) => Err(HealthProbeError::Connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

pub fn deps<'a>(
    capacity: &'a FixedCapacity,
    fs: &'a RecordingFs,
    health: &'a ScriptedHealth,
) -> PipelineDeps<'a> {
    PipelineDeps {
        capacity,
        fs,
        health,
        invoking: Some((1000, 1000)),
    }
}
