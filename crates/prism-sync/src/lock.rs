//! Per-data-source refresh locks.
//!
//! An arena of lock handles keyed by data-source id, not a global lock: a
//! refresh for source A never blocks a refresh for source B. Acquisition is
//! non-blocking; a second caller for the same id observes contention and
//! backs off (the executor records a skip). Release happens when the guard
//! drops, on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Arena of per-source mutual-exclusion handles.
#[derive(Default)]
pub struct RefreshLocks {
    handles: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one refresh run. Dropping releases the lock.
pub struct RefreshGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RefreshLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to take the lock for a data source without waiting.
    ///
    /// Returns `None` if another run currently holds it.
    pub fn try_acquire(&self, data_source_id: Uuid) -> Option<RefreshGuard> {
        let handle = {
            let mut handles = match self.handles.lock() {
                Ok(h) => h,
                Err(poisoned) => poisoned.into_inner(),
            };
            handles
                .entry(data_source_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        handle
            .try_lock_owned()
            .ok()
            .map(|guard| RefreshGuard { _guard: guard })
    }

    /// Whether the lock for a data source is currently held.
    pub fn is_held(&self, data_source_id: Uuid) -> bool {
        let handles = match self.handles.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        handles
            .get(&data_source_id)
            .map(|h| h.try_lock().is_err())
            .unwrap_or(false)
    }
}
