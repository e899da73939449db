// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process store.
//!
//! Backs single-process use and serves as the test double for the engine.
//! Faults can be injected to simulate lost connectivity or security-rule
//! rejections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::{Map, Value};
use tracing::debug;

use lc_core::{Error, Result, StorePath, Tree};

use super::{BoxFuture, ChangeCallback, RemoteSyncClient, Subscription};

/// In-memory [`RemoteSyncClient`]. Clones share the same tree.
///
/// Change callbacks run synchronously on the mutating task and must not call
/// back into the store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tree: Mutex<Tree>,
    watchers: Mutex<Vec<Watcher>>,
    /// Serializes mutation and delivery so callbacks observe changes in order.
    delivery: Mutex<()>,
    faults: Mutex<Faults>,
    mutations: Mutex<Vec<StorePath>>,
    next_watcher: AtomicU64,
}

struct Watcher {
    id: u64,
    path: StorePath,
    callback: ChangeCallback,
}

#[derive(Default)]
struct Faults {
    offline: bool,
    denied: Vec<StorePath>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every call fails with [`Error::TransientNetwork`].
    pub fn set_offline(&self, offline: bool) {
        lock(&self.inner.faults).offline = offline;
    }

    /// Rejects writes at or below `prefix` with [`Error::PermissionDenied`].
    pub fn deny_writes(&self, prefix: StorePath) {
        lock(&self.inner.faults).denied.push(prefix);
    }

    pub fn clear_faults(&self) {
        *lock(&self.inner.faults) = Faults::default();
    }

    /// Reads directly, bypassing faults.
    pub fn get(&self, path: &StorePath) -> Option<Value> {
        lock(&self.inner.tree).read(path)
    }

    /// Writes directly, bypassing faults. Subscribers are notified.
    ///
    /// Used to play the part of other clients.
    pub fn seed(&self, path: &StorePath, value: Value) -> Result<()> {
        self.inner.mutate(path, |tree| tree.set(path, value))
    }

    /// Paths written through the client API, oldest first.
    pub fn mutations(&self) -> Vec<StorePath> {
        lock(&self.inner.mutations).clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.watchers).len()
    }
}

impl MemoryInner {
    fn check_online(&self) -> Result<()> {
        if lock(&self.faults).offline {
            return Err(Error::TransientNetwork("store unreachable".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, path: &StorePath) -> Result<()> {
        self.check_online()?;
        let faults = lock(&self.faults);
        if faults.denied.iter().any(|prefix| path.starts_with(prefix)) {
            return Err(Error::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    /// Applies `apply` and notifies every watcher whose value may have changed.
    fn mutate<T>(&self, path: &StorePath, apply: impl FnOnce(&mut Tree) -> Result<T>) -> Result<T> {
        let _delivery = lock(&self.delivery);
        let (result, notifications) = {
            let mut tree = lock(&self.tree);
            let result = apply(&mut tree)?;
            let watchers = lock(&self.watchers);
            let notifications: Vec<(ChangeCallback, Option<Value>)> = watchers
                .iter()
                .filter(|w| path.affects(&w.path))
                .map(|w| (Arc::clone(&w.callback), tree.read(&w.path)))
                .collect();
            (result, notifications)
        };
        for (callback, value) in notifications {
            callback(value);
        }
        Ok(result)
    }

    fn record(&self, path: &StorePath) {
        lock(&self.mutations).push(path.clone());
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.watchers).retain(|w| w.id != id);
    }
}

impl RemoteSyncClient for MemoryStore {
    fn read_once(&self, path: &StorePath) -> BoxFuture<'_, Result<Option<Value>>> {
        let path = path.clone();
        Box::pin(async move {
            self.inner.check_online()?;
            Ok(self.get(&path))
        })
    }

    fn write(&self, path: &StorePath, value: Value) -> BoxFuture<'_, Result<()>> {
        let path = path.clone();
        Box::pin(async move {
            self.inner.check_writable(&path)?;
            self.inner.record(&path);
            self.inner.mutate(&path, |tree| tree.set(&path, value))
        })
    }

    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> BoxFuture<'_, Result<()>> {
        let path = path.clone();
        Box::pin(async move {
            self.inner.check_writable(&path)?;
            self.inner.record(&path);
            self.inner.mutate(&path, |tree| tree.merge(&path, fields))
        })
    }

    fn increment(&self, path: &StorePath, field: &str, delta: i64) -> BoxFuture<'_, Result<i64>> {
        let path = path.clone();
        let field = field.to_string();
        Box::pin(async move {
            self.inner.check_writable(&path)?;
            self.inner.record(&path);
            self.inner.mutate(&path, |tree| tree.increment(&path, &field, delta))
        })
    }

    fn subscribe(&self, path: &StorePath, on_change: ChangeCallback) -> BoxFuture<'_, Result<Subscription>> {
        let path = path.clone();
        Box::pin(async move {
            self.inner.check_online()?;
            let id = self.inner.next_watcher.fetch_add(1, Ordering::SeqCst);

            let _delivery = lock(&self.inner.delivery);
            let current = {
                let tree = lock(&self.inner.tree);
                lock(&self.inner.watchers).push(Watcher {
                    id,
                    path: path.clone(),
                    callback: Arc::clone(&on_change),
                });
                tree.read(&path)
            };
            debug!(%path, id, "memory subscription opened");
            on_change(current);

            let weak: Weak<MemoryInner> = Arc::downgrade(&self.inner);
            Ok(Subscription::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.unsubscribe(id);
                }
            }))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
