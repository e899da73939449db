// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote store abstraction.
//!
//! The engine talks to a hierarchical, push-subscribe key-value store through
//! [`RemoteSyncClient`]. Two implementations ship with the crate:
//! - [`MemoryStore`]: in-process, with fault injection for tests
//! - [`WebSocketStore`]: client for the `lc-remote` relay

mod memory;
mod websocket;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use lc_core::{Result, StorePath};

use crate::config::EngineConfig;

pub use memory::MemoryStore;
pub use websocket::WebSocketStore;

/// Boxed future returned by store calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked with the value at a subscribed path (`None` when absent).
pub type ChangeCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Push-subscribe client over a hierarchical key-value store.
///
/// Any call may fail with [`lc_core::Error::TransientNetwork`], in which case
/// the remote state is unknown. There is no atomicity across paths.
pub trait RemoteSyncClient: Send + Sync {
    /// Reads the value at `path` once.
    fn read_once(&self, path: &StorePath) -> BoxFuture<'_, Result<Option<Value>>>;

    /// Replaces the value at `path`. `Value::Null` deletes.
    fn write(&self, path: &StorePath, value: Value) -> BoxFuture<'_, Result<()>>;

    /// Shallow-merges `fields` into the object at `path`.
    fn update(&self, path: &StorePath, fields: Map<String, Value>) -> BoxFuture<'_, Result<()>>;

    /// Atomically adds `delta` to the integer at `path/field`, returning the new value.
    fn increment(&self, path: &StorePath, field: &str, delta: i64) -> BoxFuture<'_, Result<i64>>;

    /// Delivers the current value at `path`, then every later change in
    /// arrival order, until the returned [`Subscription`] is dropped.
    fn subscribe(&self, path: &StorePath, on_change: ChangeCallback) -> BoxFuture<'_, Result<Subscription>>;
}

/// Opens the store `config` names: the relay at `[remote] url`, or a fresh
/// in-process store when no remote is configured.
pub async fn open(config: &EngineConfig) -> Result<Arc<dyn RemoteSyncClient>> {
    match &config.remote {
        Some(remote) => {
            let store = WebSocketStore::connect(&remote.url, config.request_timeout()).await?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Handle to an active store subscription. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription { cancel: Some(Box::new(cancel)) }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Subscription { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
