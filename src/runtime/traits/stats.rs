// ABOUTME: Resource statistics trait for container engines.
// ABOUTME: Returns raw cumulative counters; normalization happens in the engine manager.

use super::shared_types::StatsSample;
use crate::types::ContainerId;
use async_trait::async_trait;

/// One-shot resource statistics.
#[async_trait]
pub trait StatsOps: Send + Sync {
    /// Sample a container's counters together with the previous CPU sample.
    async fn container_stats(&self, id: &ContainerId) -> Result<StatsSample, StatsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("no statistics returned for {0}")]
    Empty(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
