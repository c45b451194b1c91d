// ABOUTME: Container name validation following the engine's naming rules.
// ABOUTME: The name is the identity of the single deployed instance.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerNameError {
    #[error("container name cannot be empty")]
    Empty,

    #[error("container name exceeds maximum length of 128 characters")]
    TooLong,

    #[error("container name must start with a letter or digit")]
    BadStart,

    #[error("invalid character in container name: '{0}'")]
    InvalidChar(char),
}

/// Name of the deployed container: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(String);

impl ContainerName {
    pub fn new(value: &str) -> Result<Self, ContainerNameError> {
        let mut chars = value.chars();
        let first = chars.next().ok_or(ContainerNameError::Empty)?;

        if value.len() > 128 {
            return Err(ContainerNameError::TooLong);
        }

        if !first.is_ascii_alphanumeric() {
            return Err(ContainerNameError::BadStart);
        }

        if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '-'))
        {
            return Err(ContainerNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name for a throwaway verification container derived from this one.
    pub fn probe_name(&self, probe: &str) -> String {
        let probe: String = probe
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}-verify-{}", self.0, probe)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
