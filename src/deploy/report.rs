// ABOUTME: Run outcome assembly and rendering for every output mode.
// ABOUTME: Failure reports carry the stage, captured logs and remediation hints.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diagnostics::Warning;
use crate::output::{Output, OutputMode};

use super::error::DeployErrorKind;
use super::health::HealthReport;
use super::preflight::StorageUsage;
use super::state::Stage;

/// The sole externally observable result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub container: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<DeployErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthReport>,
    pub storage_root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageUsage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    /// Process exit code: 0 only for a fully successful run.
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Remediation steps for a failure of `kind`.
///
/// Kind-specific advice comes first; the general steps (inspect logs, reclaim
/// disk, redeploy a known-good image by hand) are always included.
pub fn remediation_hints(kind: DeployErrorKind, container: &str) -> Vec<String> {
    let mut hints = Vec::new();

    match kind {
        DeployErrorKind::InsufficientCapacity => hints.push(
            "free disk space under the engine storage root or lower preflight.min_free".to_string(),
        ),
        DeployErrorKind::MissingConfiguration => hints.push(
            "create the secrets file in config_dir and add every required key as KEY=value"
                .to_string(),
        ),
        DeployErrorKind::MissingBuildContext => hints.push(
            "run from the source checkout or point build.context at it".to_string(),
        ),
        DeployErrorKind::BuildFailed => hints.push(
            "rerun with --verbose to see the full build output".to_string(),
        ),
        DeployErrorKind::VerificationFailed => hints.push(
            "the built image does not contain the expected content; check for stale build \
             cache (do not pass --use-cache)"
                .to_string(),
        ),
        DeployErrorKind::DeployError => hints.push(format!(
            "check that port and mount paths are free: docker ps -a --filter name={}",
            container
        )),
        DeployErrorKind::HealthCheckFailed => hints.push(format!(
            "the instance was left running for inspection: docker inspect {}",
            container
        )),
        DeployErrorKind::IdentityDrift => hints.push(
            "fix ownership of the mount directories, then delete the identity marker".to_string(),
        ),
        DeployErrorKind::Runtime => hints.push(
            "check that the container engine is running and its socket is reachable".to_string(),
        ),
    }

    hints.push(format!("inspect logs: docker logs --tail 100 {}", container));
    hints.push("reclaim disk: docker system prune".to_string());
    hints.push(format!(
        "redeploy a known-good image manually: docker run -d --name {} <image>",
        container
    ));
    hints
}

/// Render the outcome. Always ends with the storage utilization line.
pub fn render(outcome: &RunOutcome, output: &Output) {
    if output.mode() == OutputMode::Json {
        output.json(outcome);
        return;
    }

    for warning in &outcome.warnings {
        output.warning(&warning.message);
    }

    if outcome.success {
        let access = outcome.access_point.as_deref().unwrap_or("-");
        output.success(&format!(
            "Deployed {} ({}) at {}",
            outcome.container, outcome.image, access
        ));
    } else {
        let stage = outcome
            .failed_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let error = outcome.error.as_deref().unwrap_or("unknown error");
        output.error(&format!("{} failed: {}", stage, error));

        if !outcome.logs.is_empty() {
            output.progress("Captured output:");
            for line in &outcome.logs {
                output.detail(line);
            }
        }

        if !outcome.hints.is_empty() {
            output.progress("Next steps:");
            for hint in &outcome.hints {
                output.detail(hint);
            }
        }
    }

    output.progress(&storage_line(outcome));
}

/// Best-effort storage utilization summary.
pub fn storage_line(outcome: &RunOutcome) -> String {
    match &outcome.storage {
        Some(usage) => format!(
            "Storage {}: {}% used, {} available",
            outcome.storage_root.display(),
            usage.percent_used(),
            usage.available()
        ),
        None => format!(
            "Storage {}: utilization unavailable",
            outcome.storage_root.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool) -> RunOutcome {
        let now = Utc::now();
        RunOutcome {
            success,
            container: "optitrade".to_string(),
            image: "optitrade:latest".to_string(),
            failed_stage: (!success).then_some(Stage::VerifyHealth),
            error_kind: (!success).then_some(DeployErrorKind::HealthCheckFailed),
            error: (!success).then(|| "health check failed after 12 attempts".to_string()),
            logs: Vec::new(),
            hints: Vec::new(),
            warnings: Vec::new(),
            access_point: success.then(|| "http://host:8501".to_string()),
            container_id: None,
            image_id: None,
            health: None,
            storage_root: PathBuf::from("/var/lib/docker"),
            storage: None,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn exit_code_zero_only_on_success() {
        assert_eq!(outcome(true).exit_code(), 0);
        assert_eq!(outcome(false).exit_code(), 1);
    }

    #[test]
    fn hints_always_include_general_steps() {
        for kind in [
            DeployErrorKind::InsufficientCapacity,
            DeployErrorKind::BuildFailed,
            DeployErrorKind::HealthCheckFailed,
        ] {
            let hints = remediation_hints(kind, "optitrade");
            assert!(hints.iter().any(|h| h.starts_with("inspect logs")));
            assert!(hints.iter().any(|h| h.starts_with("reclaim disk")));
            assert!(hints.iter().any(|h| h.contains("known-good image")));
        }
    }

    #[test]
    fn hints_name_the_container() {
        let hints = remediation_hints(DeployErrorKind::DeployError, "optitrade");
        assert!(hints[0].contains("name=optitrade"));
    }

    #[test]
    fn storage_line_reports_usage() {
        let mut o = outcome(true);
        o.storage = Some(StorageUsage {
            total: 100 * 1024,
            used: 25 * 1024,
            available: 75 * 1024,
        });
        let line = storage_line(&o);
        assert!(line.contains("/var/lib/docker"));
        assert!(line.contains("25% used"));
    }

    #[test]
    fn storage_line_without_usage() {
        assert!(storage_line(&outcome(false)).contains("unavailable"));
    }

    #[test]
    fn json_omits_empty_failure_fields() {
        let json = serde_json::to_value(outcome(true)).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("failed_stage").is_none());
        assert!(json.get("hints").is_none());
        assert_eq!(json["access_point"], "http://host:8501");
    }

    #[test]
    fn json_names_failed_stage() {
        let json = serde_json::to_value(outcome(false)).unwrap();
        assert_eq!(json["failed_stage"], "verify_health");
        assert_eq!(json["error_kind"], "HealthCheckFailed");
    }
}
