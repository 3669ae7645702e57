// ABOUTME: Optional outbound event channel for deployment lifecycle notifications.
// ABOUTME: Managers emit Started/Completed/Failed per operation to an injected sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Deploy,
    Update,
    Rollback,
    Scale,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Deploy => "deploy",
            Operation::Update => "update",
            Operation::Rollback => "rollback",
            Operation::Scale => "scale",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentEvent {
    pub deployment_id: String,
    pub operation: Operation,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeploymentEvent {
    pub fn new(deployment_id: &str, operation: Operation, kind: EventKind) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            operation,
            kind,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Receiver of lifecycle events. Emission must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DeploymentEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: DeploymentEvent) {}
}

impl EventSink for UnboundedSender<DeploymentEvent> {
    fn emit(&self, event: DeploymentEvent) {
        // A closed receiver means nobody is listening any more
        if self.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}
