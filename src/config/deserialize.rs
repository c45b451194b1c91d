// ABOUTME: Custom serde deserializers for validated config types.
// ABOUTME: Handles image references and container names.

use serde::Deserialize;

use crate::types::{ContainerName, ImageRef};

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_container_name<'de, D>(deserializer: D) -> Result<ContainerName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ContainerName::new(&s).map_err(serde::de::Error::custom)
}
