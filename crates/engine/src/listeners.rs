// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer callback registrations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::store::Subscription;

struct Listener<K, T> {
    id: u64,
    key: K,
    token: CancellationToken,
    callback: Arc<dyn Fn(T) + Send + Sync>,
}

/// Callbacks keyed by what they listen to. Each one is gated by the token of
/// the scope that registered it.
pub(crate) struct Listeners<K, T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Listener<K, T>>>,
}

impl<K, T> Listeners<K, T>
where
    K: PartialEq + Send + 'static,
    T: Clone + 'static,
{
    pub(crate) fn new() -> Self {
        Listeners { next_id: AtomicU64::new(1), entries: Mutex::new(Vec::new()) }
    }

    /// Registers `callback` under `key`. Dropping the returned subscription
    /// removes it.
    pub(crate) fn register(
        self: &Arc<Self>,
        key: K,
        token: CancellationToken,
        callback: Arc<dyn Fn(T) + Send + Sync>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().push(Listener { id, key, token, callback });
        let weak = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.lock().retain(|l| l.id != id);
            }
        })
    }

    /// Calls every live listener for `key`, outside the registry lock.
    pub(crate) fn notify(&self, key: &K, value: T) {
        let targets: Vec<(CancellationToken, Arc<dyn Fn(T) + Send + Sync>)> = self
            .lock()
            .iter()
            .filter(|l| &l.key == key && !l.token.is_cancelled())
            .map(|l| (l.token.clone(), Arc::clone(&l.callback)))
            .collect();
        for (token, callback) in targets {
            if !token.is_cancelled() {
                callback(value.clone());
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener<K, T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "listeners_tests.rs"]
mod tests;
