//! Per-group exclusion for read-modify-write of group rows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// One async mutex per group identifier. Entries exist only while a task
/// holds or waits for the lock.
#[derive(Default)]
pub struct GroupLocks {
    inner: Arc<LockMap>,
}

/// Exclusive access to one group; releases and prunes its map entry on drop.
pub struct GroupGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    map: Arc<LockMap>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `group_identifier`.
    pub async fn lock(&self, group_identifier: &str) -> GroupGuard {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(group_identifier.to_string())
                .or_default()
                .clone()
        };
        GroupGuard {
            guard: Some(slot.lock_owned().await),
            key: group_identifier.to_string(),
            map: self.inner.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the slot under the map lock, so a count of one
        // means nobody else holds or waits for it
        if map.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            map.remove(&self.key);
        }
    }
}
