// ABOUTME: Validated domain types shared by config, runtime and pipeline.
// ABOUTME: Phantom-typed ids, image references and container names.

mod container_name;
mod id;
mod image_ref;

pub use container_name::{ContainerName, ContainerNameError};
pub use id::{ContainerId, ImageId};
pub use image_ref::{ImageRef, ParseImageRefError};
