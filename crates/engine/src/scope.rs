// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Ownership of subscriptions and background tasks.
//!
//! A [`Scope`] collects everything a screen (or the engine itself) starts:
//! store subscriptions, listener registrations, and polling tasks. Disposing
//! the scope, explicitly or by dropping it, releases all of them, and no
//! callback registered through it fires afterwards.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::store::Subscription;

/// Owner of subscriptions and tasks; see the module docs.
pub struct Scope {
    token: CancellationToken,
    subscriptions: Mutex<Vec<Subscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope {
            token: CancellationToken::new(),
            subscriptions: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelled when the scope is disposed.
    ///
    /// Callbacks check it before firing.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Takes ownership of a subscription. A disposed scope releases it immediately.
    pub fn adopt(&self, subscription: Subscription) {
        if self.is_disposed() {
            subscription.unsubscribe();
            return;
        }
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subscriptions.push(subscription);
    }

    /// Spawns a task that stops when the scope is disposed.
    ///
    /// Must be called from within a tokio runtime. Does nothing once disposed.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_disposed() {
            return;
        }
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = task => {}
            }
        });
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Cancels every task and releases every subscription. Idempotent.
    pub fn dispose(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();

        let subscriptions: Vec<Subscription> = {
            let mut guard = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        debug!(subscriptions = subscriptions.len(), tasks = tasks.len(), "disposing scope");

        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        for task in tasks {
            task.abort();
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
