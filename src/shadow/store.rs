//! Concurrency-safe per-device shadow store.
//!
//! Each device owns its own lock, so mutating one shadow never blocks
//! another. The map lock is only taken to look up or insert an entry.

use super::record::{DeviceId, Shadow};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to a single device's shadow.
///
/// Engine tasks hold a handle instead of going through the store so that a
/// late completion after the device was removed updates an orphaned record
/// instead of resurrecting the device.
#[derive(Clone, Default)]
pub struct ShadowHandle {
    inner: Arc<Mutex<Shadow>>,
}

impl ShadowHandle {
    /// Snapshot of the current shadow.
    pub fn get(&self) -> Shadow {
        self.inner.lock().clone()
    }

    /// Apply `f` atomically with respect to other mutations of this device.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Shadow) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Like [`mutate`](Self::mutate), but also reports whether the change
    /// is visible to the facade. Bumps `version` and returns the new
    /// snapshot when it is.
    pub fn mutate_tracked<R>(&self, f: impl FnOnce(&mut Shadow) -> R) -> (R, Option<Shadow>) {
        let mut shadow = self.inner.lock();
        let before = shadow.clone();
        let result = f(&mut shadow);
        if shadow.differs_observably(&before) {
            shadow.version += 1;
            (result, Some(shadow.clone()))
        } else {
            (result, None)
        }
    }
}

/// Store of all device shadows, lazily initialized on first access.
#[derive(Default)]
pub struct ShadowStore {
    shadows: RwLock<HashMap<DeviceId, ShadowHandle>>,
}

impl ShadowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `id`, creating a default shadow if none exists yet.
    pub fn handle(&self, id: &DeviceId) -> ShadowHandle {
        if let Some(handle) = self.shadows.read().get(id) {
            return handle.clone();
        }
        self.shadows.write().entry(id.clone()).or_default().clone()
    }

    /// Snapshot of the shadow for `id` (default-initialized on first access).
    pub fn get(&self, id: &DeviceId) -> Shadow {
        self.handle(id).get()
    }

    /// Atomically transform the shadow for `id`.
    pub fn mutate<R>(&self, id: &DeviceId, f: impl FnOnce(&mut Shadow) -> R) -> R {
        self.handle(id).mutate(f)
    }

    /// Snapshot without creating a record.
    pub fn peek(&self, id: &DeviceId) -> Option<Shadow> {
        self.shadows.read().get(id).map(ShadowHandle::get)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.shadows.read().contains_key(id)
    }

    /// Destroy the shadow for `id`, returning its final state.
    pub fn remove(&self, id: &DeviceId) -> Option<Shadow> {
        self.shadows.write().remove(id).map(|h| h.get())
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.shadows.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
