// ABOUTME: Identity strategy for the deployed process and its writable mounts.
// ABOUTME: Fixed uid/gid with chowned directories, or the invoking identity with open modes.

use nix::unistd::{getgid, getuid};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the container's runtime identity is chosen and how host mount
/// directories are prepared for it.
///
/// One strategy is used per deployment target; a change between runs is
/// reported as drift by the validate stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Run as a fixed uid:gid; mount directories are chowned to it.
    Fixed { uid: u32, gid: u32 },
    /// Run as whoever invokes the deploy; mount directories are made
    /// world-writable instead of chowned.
    #[default]
    Inherit,
}

impl IdentityPolicy {
    /// Short name recorded in the identity marker.
    pub fn strategy_name(&self) -> &'static str {
        match self {
            IdentityPolicy::Fixed { .. } => "fixed",
            IdentityPolicy::Inherit => "inherit",
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityPolicy::Fixed { uid, gid } => write!(f, "fixed ({}:{})", uid, gid),
            IdentityPolicy::Inherit => write!(f, "inherit"),
        }
    }
}

// Accepts `identity: inherit` or `identity: { uid: 1000, gid: 1000 }`.
impl<'de> Deserialize<'de> for IdentityPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Named(String),
            Fixed { uid: u32, gid: u32 },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Named(name) if name == "inherit" => Ok(IdentityPolicy::Inherit),
            Repr::Named(name) => Err(de::Error::custom(format!(
                "unknown identity strategy '{}', expected 'inherit' or {{ uid, gid }}",
                name
            ))),
            Repr::Fixed { uid, gid } => Ok(IdentityPolicy::Fixed { uid, gid }),
        }
    }
}

/// The real uid/gid of the current process.
pub fn invoking_identity() -> (u32, u32) {
    (getuid().as_raw(), getgid().as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn invoking_identity_owns_files_it_creates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owned");
        std::fs::write(&path, "x").unwrap();
        let meta = std::fs::metadata(&path).unwrap();

        let (uid, _) = invoking_identity();
        assert_eq!(uid, meta.uid());
    }

    #[test]
    fn inherit_is_the_default_strategy() {
        assert_eq!(IdentityPolicy::default(), IdentityPolicy::Inherit);
        assert_eq!(IdentityPolicy::Inherit.strategy_name(), "inherit");
    }
}
