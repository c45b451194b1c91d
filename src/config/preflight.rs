// ABOUTME: Preflight and cleanup tunables.
// ABOUTME: Capacity threshold with human-readable byte sizes, storage root override.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct PreflightSettings {
    /// Minimum free space on the runtime's storage volume.
    #[serde(default = "default_min_free")]
    pub min_free: ByteSize,

    /// Storage root to measure. When unset the engine is asked for its root
    /// directory, falling back to `/var/lib/docker`.
    #[serde(default)]
    pub docker_root: Option<PathBuf>,
}

fn default_min_free() -> ByteSize {
    ByteSize::gib(3)
}

impl Default for PreflightSettings {
    fn default() -> Self {
        Self {
            min_free: default_min_free(),
            docker_root: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupSettings {
    /// Retire the running instance in the clean stage, before the build,
    /// so its image can be pruned. Off by default: the running instance then
    /// keeps serving until the new image has passed verification.
    #[serde(default)]
    pub retire_before_build: bool,

    /// Prune dangling images before building and after a successful deploy.
    #[serde(default = "default_prune")]
    pub prune_dangling: bool,

    /// Prune the builder's layer cache before building.
    #[serde(default = "default_prune")]
    pub prune_build_cache: bool,
}

fn default_prune() -> bool {
    true
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            retire_before_build: false,
            prune_dangling: default_prune(),
            prune_build_cache: default_prune(),
        }
    }
}

/// A byte count written as `3GiB`, `512MiB`, `100K` or a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn gib(n: u64) -> Self {
        ByteSize(n * 1024 * 1024 * 1024)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (num, unit) = s.split_at(split);
        let num: u64 = num
            .parse()
            .map_err(|_| format!("invalid byte size: {}", s))?;

        let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" | "kib" => 1024,
            "m" | "mb" | "mib" => 1024 * 1024,
            "g" | "gb" | "gib" => 1024 * 1024 * 1024,
            "t" | "tb" | "tib" => 1024 * 1024 * 1024 * 1024,
            other => return Err(format!("unknown byte size unit: {}", other)),
        };

        num.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| format!("byte size overflows: {}", s))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
        let mut value = self.0 as f64;
        if value < 1024.0 {
            return write!(f, "{} B", self.0);
        }
        let mut unit = "B";
        for u in UNITS {
            if value < 1024.0 {
                break;
            }
            value /= 1024.0;
            unit = u;
        }
        write!(f, "{:.1} {}", value, unit)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(ByteSize(n)),
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!("3GiB".parse(), Ok(ByteSize::gib(3)));
        assert_eq!("512M".parse(), Ok(ByteSize(512 * 1024 * 1024)));
        assert_eq!("100".parse(), Ok(ByteSize(100)));
    }

    #[test]
    fn rejects_unknown_units() {
        assert!("3 parsecs".parse::<ByteSize>().is_err());
    }

    #[test]
    fn displays_human_units() {
        assert_eq!(ByteSize::gib(3).to_string(), "3.0 GiB");
        assert_eq!(ByteSize(512).to_string(), "512 B");
    }
}
