// ABOUTME: Common envelope for mutating operations: per-id lock, lifecycle events, error capture.
// ABOUTME: Both backend managers route deploy/update/rollback/scale through run_operation.

use std::future::Future;

use crate::events::{DeploymentEvent, EventKind, EventSink, Operation};
use crate::model::{DeploymentResult, DeploymentStatus};

use super::{DeployError, OperationLocks};

/// Run `work` while holding the id's lock.
///
/// An error is folded into a failed `DeploymentResult` whose status comes
/// from `status_on_error`, awaited only on failure and still under the lock.
pub async fn run_operation<W, S>(
    locks: &OperationLocks,
    events: &dyn EventSink,
    id: &str,
    operation: Operation,
    work: W,
    status_on_error: S,
) -> DeploymentResult
where
    W: Future<Output = Result<DeploymentResult, DeployError>> + Send,
    S: Future<Output = DeploymentStatus> + Send,
{
    let _guard = locks.acquire(id).await;
    events.emit(DeploymentEvent::new(id, operation, EventKind::Started));

    let result = match work.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(deployment = %id, %operation, error = %e, "operation failed");
            DeploymentResult::failed(id, status_on_error.await, &e)
        }
    };

    let kind = if result.success {
        EventKind::Completed
    } else {
        EventKind::Failed
    };
    events.emit(DeploymentEvent::new(id, operation, kind).with_message(result.message.clone()));
    result
}

/// Same envelope for `delete`, which reports through `Result` instead.
pub async fn run_delete<W>(
    locks: &OperationLocks,
    events: &dyn EventSink,
    id: &str,
    work: W,
) -> Result<(), DeployError>
where
    W: Future<Output = Result<(), DeployError>> + Send,
{
    let _guard = locks.acquire(id).await;
    events.emit(DeploymentEvent::new(id, Operation::Delete, EventKind::Started));

    let outcome = work.await;
    let event = match &outcome {
        Ok(()) => DeploymentEvent::new(id, Operation::Delete, EventKind::Completed),
        Err(e) => {
            tracing::error!(deployment = %id, error = %e, "delete failed");
            DeploymentEvent::new(id, Operation::Delete, EventKind::Failed)
                .with_message(e.to_string())
        }
    };
    events.emit(event);
    outcome
}
