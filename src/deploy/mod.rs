// ABOUTME: Shared deployment machinery: error taxonomy, strategies and per-id locking.
// ABOUTME: Used by both backend managers and the orchestrator.

mod error;
mod locks;
mod operation;
mod rollback;
mod strategy;

pub use error::{DeployError, DeployErrorKind};
pub use locks::{OperationGuard, OperationLocks};
pub use operation::{run_delete, run_operation};
pub use rollback::resolve_target;
pub use strategy::{ContainerUpdatePlan, DeploymentStrategy};
