// ABOUTME: Per-deployment-id operation serialization.
// ABOUTME: Same-id operations run one at a time in arrival order; the guard releases on drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map from deployment id to its operation slot.
#[derive(Default)]
pub struct OperationLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// A held operation slot. Dropping it lets the next queued operation run.
pub struct OperationGuard<'a> {
    locks: &'a OperationLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl std::fmt::Debug for OperationGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationGuard")
            .field("id", &self.id)
            .finish()
    }
}

impl OperationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `id`. Waiters are served first come, first served.
    pub async fn acquire(&self, id: &str) -> OperationGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(id.to_string()).or_default())
        };

        let guard = slot.lock_owned().await;
        tracing::trace!(deployment = id, "operation slot acquired");

        OperationGuard {
            locks: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of ids with a live slot (held or awaited).
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        // Release before pruning so the strong count reflects waiters only
        drop(self.guard.take());

        let mut slots = self.locks.slots.lock();
        if let Some(slot) = slots.get(&self.id)
            && Arc::strong_count(slot) == 1
        {
            slots.remove(&self.id);
        }
    }
}
