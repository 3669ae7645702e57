// ABOUTME: Image operations trait for container engines.
// ABOUTME: Pull, check existence, and build images from a local context.

use super::shared_types::BuildConfig;
use crate::types::ImageRef;
use async_trait::async_trait;

/// Image operations: pull, check existence, build.
#[async_trait]
pub trait ImageOps: Send + Sync {
    /// Pull an image from a registry.
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    /// Check if an image exists locally.
    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;

    /// Build an image and return the reference it was tagged with.
    async fn build_image(&self, config: &BuildConfig) -> Result<ImageRef, ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
