use crate::principals::PrincipalRef;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockKey = (PrincipalRef, String);

/// In-process locks keyed on (principal, resource type)
///
/// Holding the guard serializes check-then-create sequences for one quota
/// inside this process. The map only keeps weak handles: an entry disappears
/// once no caller holds or waits on its mutex, never while one does.
pub struct KeyedLocks {
    locks: StdMutex<HashMap<LockKey, Weak<Mutex<()>>>>,
    prune_threshold: usize,
}

impl KeyedLocks {
    /// `prune_threshold` is the map size above which dead entries are swept
    pub fn new(prune_threshold: usize) -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
            prune_threshold: prune_threshold.max(1),
        }
    }

    pub async fn acquire(
        &self,
        principal: PrincipalRef,
        resource_type: &str,
    ) -> OwnedMutexGuard<()> {
        let lock = self.lock_for((principal, resource_type.to_string()));
        lock.lock_owned().await
    }

    fn lock_for(&self, key: LockKey) -> Arc<Mutex<()>> {
        // The map is only touched synchronously, a poisoned guard still holds valid data
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
            return lock;
        }

        if locks.len() >= self.prune_threshold {
            locks.retain(|_, lock| lock.strong_count() > 0);
        }

        let lock = Arc::new(Mutex::new(()));
        locks.insert(key, Arc::downgrade(&lock));
        lock
    }

    /// Number of tracked keys, live or not yet pruned
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
