// ABOUTME: Composable capability traits for container engines.
// ABOUTME: ContainerOps, ImageOps, LogOps, StatsOps and RuntimeInfo, combined as ContainerEngine.

mod container;
mod image;
mod logs;
mod shared_types;
mod stats;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps};
pub use logs::{LogError, LogLine, LogOps, LogOptions, LogStream, LogStreamBox};
pub use shared_types::*;
pub use stats::{StatsError, StatsOps};

use async_trait::async_trait;

/// Engine connectivity and version.
#[async_trait]
pub trait RuntimeInfo: Send + Sync {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError>;

    /// Check the engine answers at all.
    async fn ping(&self) -> Result<(), RuntimeInfoError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeInfoError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Everything the container-engine manager needs from an engine client.
pub trait ContainerEngine: ContainerOps + ImageOps + LogOps + StatsOps + RuntimeInfo {}

impl<T> ContainerEngine for T where T: ContainerOps + ImageOps + LogOps + StatsOps + RuntimeInfo {}
