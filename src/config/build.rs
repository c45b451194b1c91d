// ABOUTME: Build settings and post-build verification probes.
// ABOUTME: Probes run in throwaway containers from the new image and must exit 0.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    /// Build context root (the source checkout).
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Dockerfile path, relative to the context.
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    /// Disable the layer cache. Interpreted sources make cached layers able
    /// to serve old logic, so production runs keep this on.
    #[serde(default = "default_no_cache")]
    pub no_cache: bool,

    #[serde(default = "default_probes")]
    pub probes: Vec<VerificationProbe>,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_no_cache() -> bool {
    true
}

fn default_probes() -> Vec<VerificationProbe> {
    vec![
        VerificationProbe {
            name: "tool-integration".to_string(),
            check: ProbeCheck::Command {
                command: vec![
                    "python".to_string(),
                    "-c".to_string(),
                    "from src.tools import find_nifty_expiry_dates".to_string(),
                ],
            },
        },
        VerificationProbe {
            name: "bytecode-disabled".to_string(),
            check: ProbeCheck::EnvEquals {
                env: "PYTHONDONTWRITEBYTECODE".to_string(),
                expected: "1".to_string(),
            },
        },
    ]
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            context: default_context(),
            dockerfile: default_dockerfile(),
            no_cache: default_no_cache(),
            probes: default_probes(),
        }
    }
}

/// A named check executed against the freshly built image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerificationProbe {
    pub name: String,
    #[serde(flatten)]
    pub check: ProbeCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProbeCheck {
    /// Run a command (for example an import of a symbol only present in the
    /// expected code path).
    Command { command: Vec<String> },
    /// Assert that an environment variable resolves to a literal value.
    EnvEquals { env: String, expected: String },
}

impl VerificationProbe {
    /// Entrypoint override for the probe container.
    pub fn entrypoint(&self) -> Vec<String> {
        match &self.check {
            ProbeCheck::Command { command } => command.clone(),
            ProbeCheck::EnvEquals { env, expected } => vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("test \"${{{}}}\" = '{}'", env, expected.replace('\'', r"'\''")),
            ],
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("verification probe name cannot be empty".to_string());
        }
        match &self.check {
            ProbeCheck::Command { command } if command.is_empty() => Err(format!(
                "verification probe '{}' has an empty command",
                self.name
            )),
            ProbeCheck::EnvEquals { env, .. } if !is_env_name(env) => Err(format!(
                "verification probe '{}' names an invalid variable: {}",
                self.name, env
            )),
            _ => Ok(()),
        }
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_probe_quotes_expected_value() {
        let probe = VerificationProbe {
            name: "env".to_string(),
            check: ProbeCheck::EnvEquals {
                env: "MODE".to_string(),
                expected: "it's".to_string(),
            },
        };
        assert_eq!(
            probe.entrypoint(),
            vec!["sh", "-c", r#"test "${MODE}" = 'it'\''s'"#]
        );
    }

    #[test]
    fn rejects_invalid_env_names() {
        let probe = VerificationProbe {
            name: "env".to_string(),
            check: ProbeCheck::EnvEquals {
                env: "1BAD".to_string(),
                expected: "x".to_string(),
            },
        };
        assert!(probe.validate().is_err());
    }

    #[test]
    fn default_probes_cover_code_and_env() {
        let probes = BuildSettings::default().probes;
        assert!(matches!(probes[0].check, ProbeCheck::Command { .. }));
        assert!(matches!(probes[1].check, ProbeCheck::EnvEquals { .. }));
    }
}
