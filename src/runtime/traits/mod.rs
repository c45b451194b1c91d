// ABOUTME: Composable capability traits for the container engine.
// ABOUTME: Defines ImageOps, ContainerOps, LogOps and RuntimeInfo plus the FullRuntime bundle.

mod container;
mod image;
mod logs;
mod runtime_info;
pub(crate) mod sealed;
mod shared_types;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps};
pub use logs::{LogError, LogLine, LogLineStream, LogOps, LogOptions, LogStream};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError};
pub use shared_types::*;

/// Every capability the deployment pipeline needs from one engine connection.
pub trait FullRuntime: ContainerOps + ImageOps + LogOps + RuntimeInfo {}

impl<T> FullRuntime for T where T: ContainerOps + ImageOps + LogOps + RuntimeInfo {}
