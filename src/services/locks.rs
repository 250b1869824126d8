//! Per-reference mutual exclusion.
//!
//! Callbacks and expiry for the same payment reference are serialized through
//! one async mutex per key; different keys never contend. Entries are removed
//! once the last holder or waiter lets go, so the registry stays proportional
//! to in-flight work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct ReferenceLocks {
    slots: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReferenceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> ReferenceGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.to_string()).or_default().clone()
        };

        let guard = slot.lock_owned().await;

        ReferenceGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ReferenceGuard<'a> {
    locks: &'a ReferenceLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ReferenceGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ReferenceGuard<'_> {
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts as a holder.
        drop(self.guard.take());

        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.key);
            }
        }
    }
}
