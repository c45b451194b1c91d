// ABOUTME: Check command implementation.
// ABOUTME: Runs preflight and config validation without touching the engine's state.

use std::path::PathBuf;

use serde::Serialize;

use super::runtime_connection::connect_to_runtime;
use shipit::config::RunConfig;
use shipit::deploy::{
    DEFAULT_STORAGE_ROOT, DfProbe, PreflightReport, Stage, check as preflight_check, enforce,
    resolve_storage_root, validate, writable_mount_sources,
};
use shipit::diagnostics::{Diagnostics, Warning};
use shipit::error::{Error, Result};
use shipit::output::Output;

#[derive(Serialize)]
struct CheckSummary<'a> {
    ok: bool,
    report: &'a PreflightReport,
    mounts: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    warnings: &'a [Warning],
}

/// Preflight and Validate Config only.
pub async fn check(config: RunConfig, output: Output) -> Result<()> {
    let mut diag = Diagnostics::default();

    // The engine is only asked for its storage root here.
    let storage_root = match connect_to_runtime(&config, &output).await {
        Ok(runtime) => resolve_storage_root(&config, &runtime, &mut diag).await,
        Err(e) => {
            diag.warn(Warning::engine_info(format!(
                "container engine unavailable: {}",
                e
            )));
            config
                .preflight
                .docker_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT))
        }
    };

    let report = preflight_check(&storage_root, &config, &DfProbe, &mut diag).await;
    let result = enforce(&report, config.preflight.min_free)
        .map_err(|e| (Stage::Preflight, e))
        .and_then(|()| {
            validate(&report, &config, &mut diag).map_err(|e| (Stage::ValidateConfig, e))
        });

    let summary = CheckSummary {
        ok: result.is_ok(),
        report: &report,
        mounts: writable_mount_sources(&config),
        error: result.as_ref().err().map(|(_, e)| e.to_string()),
        warnings: diag.warnings(),
    };
    output.json(&summary);
    print_report(&summary, &output);

    match result {
        Ok(()) => {
            output.success("All checks passed");
            Ok(())
        }
        Err((stage, e)) => {
            output.error(&e.to_string());
            Err(Error::RunFailed {
                stage: stage.to_string(),
            })
        }
    }
}

fn print_report(summary: &CheckSummary<'_>, output: &Output) {
    let report = summary.report;
    match &report.storage {
        Some(usage) => output.progress(&format!(
            "Storage {}: {} available ({}% used)",
            report.storage_root.display(),
            usage.available(),
            usage.percent_used()
        )),
        None => output.progress(&format!(
            "Storage {}: unknown",
            report.storage_root.display()
        )),
    }

    output.progress(&format!(
        "Secrets file {}: {}",
        report.secrets_file.display(),
        if report.secrets_present { "present" } else { "missing" }
    ));
    for item in report.keys.iter().chain(&report.build_paths) {
        output.detail(&format!(
            "{} {}",
            if item.passed { "✓" } else { "✗" },
            item.name
        ));
    }

    for mount in &summary.mounts {
        output.progress(&format!("Mount source: {}", mount.display()));
    }

    for warning in summary.warnings {
        output.warning(&warning.message);
    }
}
