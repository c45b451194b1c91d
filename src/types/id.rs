// ABOUTME: Phantom-typed identifiers assigned by the container runtime.
// ABOUTME: Keeps container and image ids from being swapped at compile time.

use serde::{Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker for container ids. Empty enums cannot be instantiated.
pub enum ContainerMarker {}
/// Marker for image ids.
pub enum ImageMarker {}

/// An opaque runtime-assigned identifier.
///
/// The phantom parameter makes a `ContainerId` and an `ImageId` distinct
/// types even though both wrap the same string the engine hands back.
#[must_use = "ids reference runtime resources"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// First 12 characters, the form `docker ps` prints.
    pub fn short(&self) -> &str {
        let value = self.value.strip_prefix("sha256:").unwrap_or(&self.value);
        match value.char_indices().nth(12) {
            Some((idx, _)) => &value[..idx],
            None => value,
        }
    }
}

// Manual impls: T is only a marker and implements nothing.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

pub type ContainerId = Id<ContainerMarker>;
pub type ImageId = Id<ImageMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strips_digest_prefix() {
        let id = ImageId::new("sha256:0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
    }

    #[test]
    fn short_keeps_short_values() {
        let id = ContainerId::new("abc");
        assert_eq!(id.short(), "abc");
    }
}
