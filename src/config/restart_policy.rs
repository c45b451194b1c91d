// ABOUTME: Container restart policy configuration.
// ABOUTME: Accepts no, unless-stopped and on-failure[:max-retries]; "always" is refused.

use serde::de::{self, Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Restart policy applied to the long-running instance.
///
/// `always` is not accepted: an instance that crash-loops right after launch
/// would otherwise be restarted by the engine forever, including after an
/// operator stops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    No,
    #[default]
    UnlessStopped,
    OnFailure {
        max_retries: Option<u32>,
    },
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" => Ok(RestartPolicy::No),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            "on-failure" => Ok(RestartPolicy::OnFailure { max_retries: None }),
            "always" => Err(
                "restart policy 'always' is not supported, use 'unless-stopped'".to_string(),
            ),
            s => match s.strip_prefix("on-failure:") {
                Some(retries) => retries
                    .parse::<u32>()
                    .map(|n| RestartPolicy::OnFailure {
                        max_retries: Some(n),
                    })
                    .map_err(|_| format!("invalid max retries: {}", retries)),
                None => Err(format!("unknown restart policy: {}", s)),
            },
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::No => write!(f, "no"),
            RestartPolicy::UnlessStopped => write!(f, "unless-stopped"),
            RestartPolicy::OnFailure { max_retries: None } => write!(f, "on-failure"),
            RestartPolicy::OnFailure {
                max_retries: Some(n),
            } => write!(f, "on-failure:{}", n),
        }
    }
}

impl<'de> Deserialize<'de> for RestartPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_policies() {
        assert_eq!("no".parse(), Ok(RestartPolicy::No));
        assert_eq!("unless-stopped".parse(), Ok(RestartPolicy::UnlessStopped));
        assert_eq!(
            "on-failure:5".parse(),
            Ok(RestartPolicy::OnFailure {
                max_retries: Some(5)
            })
        );
    }

    #[test]
    fn refuses_always() {
        let err = "always".parse::<RestartPolicy>().unwrap_err();
        assert!(err.contains("unless-stopped"));
    }

    #[test]
    fn display_matches_engine_names() {
        assert_eq!(RestartPolicy::default().to_string(), "unless-stopped");
        assert_eq!(
            RestartPolicy::OnFailure {
                max_retries: Some(3)
            }
            .to_string(),
            "on-failure:3"
        );
    }
}
