//! Per-identity mutual exclusion.
//!
//! A read-merge-rewrite cycle holds its identity's lock from the read of the
//! master table until the rename of the new one, so two cycles for the same
//! identity never interleave. Different identities never contend.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::identity::SeriesId;

#[derive(Debug, Default)]
pub struct IdentityLocks {
    inner: Mutex<HashMap<SeriesId, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &SeriesId) -> Arc<AsyncMutex<()>> {
        // The map is only touched for O(1) inserts; a poisoned guard is still usable.
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(id.clone()).or_default())
    }

    /// Waits until no other holder has `id`, then returns the guard.
    pub async fn lock(&self, id: &SeriesId) -> OwnedMutexGuard<()> {
        self.entry(id).lock_owned().await
    }

    /// Takes the lock only if it is free right now.
    pub fn try_lock(&self, id: &SeriesId) -> Option<OwnedMutexGuard<()>> {
        self.entry(id).try_lock_owned().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
