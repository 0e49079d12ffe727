//! Local indexed store of watched resources.
//!
//! Written only by the informer task; read concurrently by reconcile
//! workers. Readers get `Arc` handles to shared instances, so any mutation
//! requires an explicit clone first (deep-copy-before-mutate contract).

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::crd::ReconcileKey;

/// A resource that can be indexed by (namespace, name) and carries a
/// resource version.
pub trait WatchedResource {
    fn reconcile_key(&self) -> ReconcileKey;
    fn resource_version(&self) -> Option<String>;
}

/// Changes produced by replacing the full store contents after a list.
#[derive(Debug)]
pub struct SyncDelta<T> {
    pub added: Vec<Arc<T>>,
    pub updated: Vec<Arc<T>>,
    pub removed: Vec<Arc<T>>,
}

impl<T> Default for SyncDelta<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Concurrency-safe index of watched resources.
pub struct Store<T> {
    inner: RwLock<HashMap<ReconcileKey, Arc<T>>>,
}

impl<T: WatchedResource> Store<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ReconcileKey, Arc<T>>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ReconcileKey, Arc<T>>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &ReconcileKey) -> Option<Arc<T>> {
        self.read().get(key).cloned()
    }

    pub fn list(&self) -> Vec<Arc<T>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Insert or replace an object, returning its handle.
    pub fn apply(&self, object: T) -> Arc<T> {
        let key = object.reconcile_key();
        let object = Arc::new(object);
        self.write().insert(key, Arc::clone(&object));
        object
    }

    /// Remove an object by key, returning the removed handle if present.
    pub fn delete(&self, key: &ReconcileKey) -> Option<Arc<T>> {
        self.write().remove(key)
    }

    /// Replace the full contents with a fresh list result, computing which
    /// objects were added, updated, or removed relative to the previous
    /// contents.
    pub fn replace_all(&self, objects: Vec<T>) -> SyncDelta<T> {
        let mut next: HashMap<ReconcileKey, Arc<T>> = HashMap::with_capacity(objects.len());
        for object in objects {
            next.insert(object.reconcile_key(), Arc::new(object));
        }

        let mut guard = self.write();
        let previous = std::mem::replace(&mut *guard, next);

        let mut delta = SyncDelta::default();
        for (key, object) in guard.iter() {
            if previous.contains_key(key) {
                delta.updated.push(Arc::clone(object));
            } else {
                delta.added.push(Arc::clone(object));
            }
        }
        for (key, object) in previous {
            if !guard.contains_key(&key) {
                delta.removed.push(object);
            }
        }
        delta
    }
}

impl<T: WatchedResource> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}
