// ABOUTME: Image operations trait for the container engine.
// ABOUTME: Build from a local context, prune dangling images and the build cache.

use super::sealed::Sealed;
use super::shared_types::{BuildOutput, BuildRequest, PruneReport};
use async_trait::async_trait;

/// Image operations: build and prune.
#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Build and tag an image from a tar-encoded context.
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput, ImageError>;

    /// Delete dangling (untagged) images.
    async fn prune_dangling_images(&self) -> Result<PruneReport, ImageError>;

    /// Delete the builder's layer cache.
    async fn prune_build_cache(&self) -> Result<PruneReport, ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("build failed: {message}")]
    BuildFailed {
        message: String,
        /// Trailing lines of build output.
        log_tail: Vec<String>,
    },

    #[error("runtime error: {0}")]
    Runtime(String),
}
