// ABOUTME: Preflight checks run before anything on the host is changed.
// ABOUTME: Storage capacity via df, build-context paths, secrets file and key presence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

use crate::config::{ByteSize, RunConfig};
use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::RuntimeInfo;

use super::error::DeployError;

/// Fallback storage root when neither config nor engine provide one.
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/docker";

/// Usage of the filesystem holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub total: u64,
    pub used: u64,
    pub available: u64,
}

impl StorageUsage {
    pub fn available(&self) -> ByteSize {
        ByteSize(self.available)
    }

    pub fn percent_used(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        (self.used.saturating_mul(100)).div_ceil(self.total)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("failed to run df: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("df exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unrecognised df output: {0}")]
    Parse(String),
}

/// Source of free-space figures for a path.
#[async_trait]
pub trait CapacityProbe: Send + Sync {
    async fn usage(&self, path: &Path) -> Result<StorageUsage, CapacityError>;
}

/// Runs `df -Pk <path>` and reads the POSIX output.
#[derive(Debug, Default, Clone, Copy)]
pub struct DfProbe;

#[async_trait]
impl CapacityProbe for DfProbe {
    async fn usage(&self, path: &Path) -> Result<StorageUsage, CapacityError> {
        let output = Command::new("df").arg("-Pk").arg(path).output().await?;

        if !output.status.success() {
            return Err(CapacityError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_df_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `df -P -k` output: header line, then one data line whose columns are
/// filesystem, 1024-blocks, used, available, capacity, mount point.
pub fn parse_df_output(stdout: &str) -> Result<StorageUsage, CapacityError> {
    let line = stdout
        .lines()
        .skip(1)
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| CapacityError::Parse(stdout.trim().to_string()))?;

    // Count from the right: the filesystem name may contain spaces.
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 6 {
        return Err(CapacityError::Parse(line.to_string()));
    }
    let n = cols.len();
    let kib = |s: &str| {
        s.parse::<u64>()
            .ok()
            .and_then(|v| v.checked_mul(1024))
            .ok_or_else(|| CapacityError::Parse(line.to_string()))
    };

    Ok(StorageUsage {
        total: kib(cols[n - 5])?,
        used: kib(cols[n - 4])?,
        available: kib(cols[n - 3])?,
    })
}

/// True when `content` has a line starting with the literal `KEY=`.
pub fn key_assigned(content: &str, key: &str) -> bool {
    content
        .lines()
        .any(|line| line.strip_prefix(key).is_some_and(|rest| rest.starts_with('=')))
}

/// Required keys without a literal assignment, in the order given.
pub fn missing_keys(content: &str, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|key| !key_assigned(content, key))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckItem {
    pub name: String,
    pub passed: bool,
}

/// Everything preflight learned about the host and the inputs.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    pub storage_root: PathBuf,
    /// `None` when the capacity probe was unavailable.
    pub storage: Option<StorageUsage>,
    pub secrets_file: PathBuf,
    pub secrets_present: bool,
    pub keys: Vec<CheckItem>,
    pub build_paths: Vec<CheckItem>,
}

impl PreflightReport {
    pub fn missing_keys(&self) -> Vec<String> {
        failed(&self.keys)
    }

    pub fn missing_build_paths(&self) -> Vec<PathBuf> {
        failed(&self.build_paths)
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
}

fn failed(items: &[CheckItem]) -> Vec<String> {
    items
        .iter()
        .filter(|i| !i.passed)
        .map(|i| i.name.clone())
        .collect()
}

/// Storage root to measure: config override, then the engine's report,
/// then [`DEFAULT_STORAGE_ROOT`].
pub async fn resolve_storage_root<R: RuntimeInfo>(
    config: &RunConfig,
    runtime: &R,
    diag: &mut Diagnostics,
) -> PathBuf {
    if let Some(root) = &config.preflight.docker_root {
        return root.clone();
    }

    let reason = match runtime.info().await {
        Ok(meta) => match meta.root_dir {
            Some(root) => return root,
            None => format!("{} did not report a storage root", meta.name),
        },
        Err(e) => e.to_string(),
    };

    diag.warn(Warning::engine_info(format!(
        "{}; measuring {}",
        reason, DEFAULT_STORAGE_ROOT
    )));
    PathBuf::from(DEFAULT_STORAGE_ROOT)
}

/// Gather the preflight report without enforcing anything.
///
/// An unavailable capacity probe is recorded as a warning and leaves
/// `storage` empty.
pub async fn check(
    storage_root: &Path,
    config: &RunConfig,
    capacity: &dyn CapacityProbe,
    diag: &mut Diagnostics,
) -> PreflightReport {
    let storage = match capacity.usage(storage_root).await {
        Ok(usage) => Some(usage),
        Err(e) => {
            diag.warn(Warning::capacity_unavailable(format!(
                "could not measure free space under {}: {}",
                storage_root.display(),
                e
            )));
            None
        }
    };

    let secrets_file = config.secrets_path();
    let content = std::fs::read_to_string(&secrets_file).ok();
    let keys = config
        .required_keys
        .iter()
        .map(|key| CheckItem {
            name: key.clone(),
            passed: content.as_deref().is_some_and(|c| key_assigned(c, key)),
        })
        .collect();

    let context = &config.build.context;
    let build_paths = std::iter::once(PathBuf::from(&config.build.dockerfile))
        .chain(config.required_paths.iter().cloned())
        .map(|rel| CheckItem {
            passed: context.join(&rel).exists(),
            name: rel.display().to_string(),
        })
        .collect();

    PreflightReport {
        storage_root: storage_root.to_path_buf(),
        storage,
        secrets_present: content.is_some(),
        secrets_file,
        keys,
        build_paths,
    }
}

/// Hard gates of the preflight stage: capacity, then build context.
pub fn enforce(report: &PreflightReport, min_free: ByteSize) -> Result<(), DeployError> {
    if let Some(usage) = report.storage
        && usage.available() < min_free
    {
        return Err(DeployError::InsufficientCapacity {
            path: report.storage_root.clone(),
            available: usage.available(),
            required: min_free,
        });
    }

    let missing = report.missing_build_paths();
    if !missing.is_empty() {
        return Err(DeployError::MissingBuildContext { paths: missing });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DF_OUTPUT: &str = "\
Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/sda1        102400000 98000000   4400000      96% /
";

    #[test]
    fn parses_posix_df_output() {
        let usage = parse_df_output(DF_OUTPUT).unwrap();
        assert_eq!(usage.available, 4_400_000 * 1024);
        assert_eq!(usage.total, 102_400_000 * 1024);
        assert_eq!(usage.percent_used(), 96);
    }

    #[test]
    fn filesystem_names_with_spaces_still_parse() {
        let out = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                   my volume 1000 400 600 40% /mnt/data\n";
        assert_eq!(parse_df_output(out).unwrap().available, 600 * 1024);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_df_output("df: /nowhere: No such file or directory\n"),
            Err(CapacityError::Parse(_))
        ));
    }

    #[test]
    fn block_counts_too_large_for_bytes_are_a_parse_error() {
        let huge = u64::MAX / 1024 + 1;
        let out = format!(
            "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
             /dev/sda1 {huge} 1 {huge} 1% /\n"
        );
        assert!(matches!(parse_df_output(&out), Err(CapacityError::Parse(_))));
    }

    #[test]
    fn key_must_be_literal_assignment_at_line_start() {
        let content = "ANGEL_API_KEY=abc\n  ANGEL_MPIN=1234\n# ANGEL_CLIENT_ID=x\nANGEL_TOTP=1\n";
        assert!(key_assigned(content, "ANGEL_API_KEY"));
        assert!(!key_assigned(content, "ANGEL_MPIN"));
        assert!(!key_assigned(content, "ANGEL_CLIENT_ID"));
        assert!(!key_assigned(content, "ANGEL_TOTP_SECRET"));
    }

    #[test]
    fn empty_value_still_counts_as_assigned() {
        assert!(key_assigned("ANGEL_MPIN=\n", "ANGEL_MPIN"));
    }

    #[test]
    fn missing_keys_reports_all_in_order() {
        let required: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(missing_keys("B=1\n", &required), vec!["A", "C"]);
    }

    #[test]
    fn capacity_gate_compares_against_threshold() {
        let report = PreflightReport {
            storage_root: PathBuf::from("/var/lib/docker"),
            storage: Some(StorageUsage {
                total: 10 * 1024 * 1024 * 1024,
                used: 9 * 1024 * 1024 * 1024,
                available: 1024 * 1024 * 1024,
            }),
            secrets_file: PathBuf::from("/cfg/.env"),
            secrets_present: true,
            keys: vec![],
            build_paths: vec![],
        };
        let err = enforce(&report, ByteSize::gib(3)).unwrap_err();
        assert!(matches!(err, DeployError::InsufficientCapacity { .. }));
        assert!(enforce(&report, ByteSize::gib(1)).is_ok());
    }
}
