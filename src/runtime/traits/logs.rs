// ABOUTME: Log operations trait for container engines.
// ABOUTME: Streams container logs with tail and since filtering.

use crate::types::ContainerId;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type LogStreamBox = Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>;

/// Log streaming operations.
#[async_trait]
pub trait LogOps: Send + Sync {
    /// Stream logs from a container.
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogStreamBox, LogError>;
}

/// Options for log streaming.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    /// Follow log output (like `tail -f`).
    pub follow: bool,
    pub timestamps: bool,
    /// Number of lines to show from end (None = all).
    pub tail: Option<u64>,
    /// Only lines newer than this Unix timestamp.
    pub since: Option<i64>,
}

impl LogOptions {
    /// Both streams, no follow.
    pub fn snapshot() -> Self {
        Self {
            stdout: true,
            stderr: true,
            ..Default::default()
        }
    }

    /// Create options for tailing the last N lines.
    pub fn tail(n: u64) -> Self {
        Self {
            tail: Some(n),
            ..Self::snapshot()
        }
    }
}

/// A single log line from a container.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub content: String,
    pub stream: LogStream,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Errors from log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
