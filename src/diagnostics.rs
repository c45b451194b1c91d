// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects recovered conditions that must be reported without failing the run.

use serde::Serialize;

/// Collects non-fatal warnings during a deployment run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn capacity_unavailable(message: impl Into<String>) -> Self {
        Self::new(WarningKind::CapacityUnavailable, message)
    }

    pub fn engine_info(message: impl Into<String>) -> Self {
        Self::new(WarningKind::EngineInfo, message)
    }

    pub fn prune_failed(message: impl Into<String>) -> Self {
        Self::new(WarningKind::PruneFailed, message)
    }

    pub fn probe_cleanup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ProbeCleanup, message)
    }

    pub fn identity_marker(message: impl Into<String>) -> Self {
        Self::new(WarningKind::IdentityMarker, message)
    }
}

/// Categories of recovered conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The free-space probe could not run or its output was unreadable.
    CapacityUnavailable,
    /// The engine did not report its storage root; the default was used.
    EngineInfo,
    /// Dangling image prune failed.
    PruneFailed,
    /// A verification probe container could not be removed.
    ProbeCleanup,
    /// The identity marker could not be read or written.
    IdentityMarker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings_in_order() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::capacity_unavailable("df not found"));
        diag.warn(Warning::prune_failed("engine busy"));

        let kinds: Vec<_> = diag.warnings().iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![WarningKind::CapacityUnavailable, WarningKind::PruneFailed]
        );
    }

    #[test]
    fn warning_kind_serializes_snake_case() {
        let json = serde_json::to_string(&Warning::probe_cleanup("x")).unwrap();
        assert!(json.contains("\"probe_cleanup\""));
    }
}
