// ABOUTME: Validate Config stage: secrets file, required keys, identity drift.
// ABOUTME: Also owns the identity marker persisted next to the secrets file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{IdentityPolicy, RunConfig};
use crate::diagnostics::{Diagnostics, Warning};

use super::error::DeployError;
use super::preflight::PreflightReport;

const MARKER_DIR: &str = ".shipit";
const MARKER_FILE: &str = "identity.json";

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("identity marker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity marker is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity strategy used by the last deploy to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    pub container: String,
    pub recorded_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn new(policy: &IdentityPolicy, container: &str) -> Self {
        let (uid, gid) = match policy {
            IdentityPolicy::Fixed { uid, gid } => (Some(*uid), Some(*gid)),
            IdentityPolicy::Inherit => (None, None),
        };
        Self {
            strategy: policy.strategy_name().to_string(),
            uid,
            gid,
            container: container.to_string(),
            recorded_at: Utc::now(),
        }
    }

    pub fn marker_path(config_dir: &Path) -> PathBuf {
        config_dir.join(MARKER_DIR).join(MARKER_FILE)
    }

    /// Read the marker; `None` when no deploy has recorded one yet.
    pub fn load(config_dir: &Path) -> Result<Option<Self>, MarkerError> {
        let path = Self::marker_path(config_dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn store(&self, config_dir: &Path) -> Result<(), MarkerError> {
        let path = Self::marker_path(config_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn matches(&self, policy: &IdentityPolicy) -> bool {
        match policy {
            IdentityPolicy::Inherit => self.strategy == "inherit",
            IdentityPolicy::Fixed { uid, gid } => {
                self.strategy == "fixed" && self.uid == Some(*uid) && self.gid == Some(*gid)
            }
        }
    }

    pub fn describe(&self) -> String {
        match (self.uid, self.gid) {
            (Some(uid), Some(gid)) => format!("{} ({}:{})", self.strategy, uid, gid),
            _ => self.strategy.clone(),
        }
    }
}

/// Fail on the first configuration problem, reporting all missing keys at once.
pub fn validate(
    report: &PreflightReport,
    config: &RunConfig,
    diag: &mut Diagnostics,
) -> Result<(), DeployError> {
    if !report.secrets_present {
        return Err(DeployError::SecretsFileMissing(report.secrets_file.clone()));
    }

    let keys = report.missing_keys();
    if !keys.is_empty() {
        return Err(DeployError::MissingKeys {
            file: report.secrets_file.clone(),
            keys,
        });
    }

    match IdentityRecord::load(&config.config_dir) {
        Ok(Some(record)) if !record.matches(&config.identity) => {
            return Err(DeployError::IdentityDrift {
                previous: record.describe(),
                current: config.identity.to_string(),
                marker: IdentityRecord::marker_path(&config.config_dir),
            });
        }
        Ok(_) => {}
        Err(e) => diag.warn(Warning::identity_marker(format!(
            "ignoring unreadable identity marker: {}",
            e
        ))),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_round_trip_and_match() {
        let dir = tempfile::tempdir().unwrap();
        let policy = IdentityPolicy::Fixed {
            uid: 1000,
            gid: 1000,
        };
        IdentityRecord::new(&policy, "app").store(dir.path()).unwrap();

        let loaded = IdentityRecord::load(dir.path()).unwrap().unwrap();
        assert!(loaded.matches(&policy));
        assert!(!loaded.matches(&IdentityPolicy::Inherit));
        assert!(!loaded.matches(&IdentityPolicy::Fixed {
            uid: 1001,
            gid: 1000
        }));
        assert_eq!(loaded.describe(), "fixed (1000:1000)");
    }

    #[test]
    fn absent_marker_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IdentityRecord::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn corrupt_marker_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = IdentityRecord::marker_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            IdentityRecord::load(dir.path()),
            Err(MarkerError::Json(_))
        ));
    }
}
