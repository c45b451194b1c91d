// ABOUTME: Published port and bind-mount specifications.
// ABOUTME: Parses "host:container" ports and "source:target[:ro]" volumes.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The single port published by the service, host side first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPort {
    pub host: u16,
    pub container: u16,
}

impl FromStr for PublishedPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |p: &str| {
            p.trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| format!("invalid port: {}", p))
        };
        match s.split_once(':') {
            Some((host, container)) => Ok(PublishedPort {
                host: parse(host)?,
                container: parse(container)?,
            }),
            None => {
                let port = parse(s)?;
                Ok(PublishedPort {
                    host: port,
                    container: port,
                })
            }
        }
    }
}

impl fmt::Display for PublishedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

impl<'de> Deserialize<'de> for PublishedPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u16),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => n.to_string().parse().map_err(de::Error::custom),
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

/// A bind mount from a host directory into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl FromStr for VolumeSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (source, target, read_only) = match parts.as_slice() {
            [source, target] => (*source, *target, false),
            [source, target, "ro"] => (*source, *target, true),
            [source, target, "rw"] => (*source, *target, false),
            _ => return Err(format!("invalid volume, expected source:target[:ro]: {}", s)),
        };

        if source.is_empty() {
            return Err(format!("volume source cannot be empty: {}", s));
        }
        if !target.starts_with('/') {
            return Err(format!("volume target must be an absolute path: {}", target));
        }

        Ok(VolumeSpec {
            source: PathBuf::from(source),
            target: target.to_string(),
            read_only,
        })
    }
}

impl<'de> Deserialize<'de> for VolumeSpec {
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
    fn single_port_publishes_same_number() {
        let port: PublishedPort = "8501".parse().unwrap();
        assert_eq!(port, PublishedPort { host: 8501, container: 8501 });
    }

    #[test]
    fn host_and_container_ports() {
        let port: PublishedPort = "80:8501".parse().unwrap();
        assert_eq!(port.host, 80);
        assert_eq!(port.container, 8501);
    }

    #[test]
    fn rejects_port_zero() {
        assert!("0:8501".parse::<PublishedPort>().is_err());
    }

    #[test]
    fn parses_read_only_volume() {
        let v: VolumeSpec = "/srv/cfg:/app/cfg:ro".parse().unwrap();
        assert!(v.read_only);
        assert_eq!(v.target, "/app/cfg");
    }

    #[test]
    fn rejects_relative_target() {
        assert!("/srv/out:app/out".parse::<VolumeSpec>().is_err());
    }
}
