// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Wraps the canonical store tree for thread-safe access. Every mutation is
//! announced on a broadcast channel carrying the changed path; connections
//! decide which of their subscriptions it affects.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use lc_core::{Result, StorePath, Tree};

const STORE_FILE_NAME: &str = "store.json";

/// Shared server state containing the canonical tree.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    /// The canonical tree (protected by mutex for writes).
    tree: Mutex<Tree>,
    /// Broadcast channel announcing changed paths.
    changes: broadcast::Sender<StorePath>,
    /// Snapshot file, when persistence is enabled.
    data_file: Option<PathBuf>,
}

impl ServerState {
    /// Creates a state that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_tree(Tree::new(), None)
    }

    /// Creates a state persisted to `store.json` in `data_dir`, loading any existing snapshot.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let data_file = data_dir.join(STORE_FILE_NAME);
        let tree = if data_file.exists() {
            let content = fs::read_to_string(&data_file)?;
            let tree = Tree::from_value(serde_json::from_str(&content)?);
            info!("Loaded snapshot from {}", data_file.display());
            tree
        } else {
            Tree::new()
        };
        Ok(Self::with_tree(tree, Some(data_file)))
    }

    fn with_tree(tree: Tree, data_file: Option<PathBuf>) -> Self {
        // Create broadcast channel with reasonable buffer
        let (changes, _) = broadcast::channel(1024);
        ServerState {
            inner: Arc::new(ServerStateInner {
                tree: Mutex::new(tree),
                changes,
                data_file,
            }),
        }
    }

    pub async fn read(&self, path: &StorePath) -> Option<Value> {
        self.inner.tree.lock().await.read(path)
    }

    pub async fn write(&self, path: &StorePath, value: Value) -> Result<()> {
        self.mutate(path, |tree| tree.set(path, value)).await
    }

    pub async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<()> {
        self.mutate(path, |tree| tree.merge(path, fields)).await
    }

    /// Atomically adds `delta` to the integer at `path/field`.
    pub async fn increment(&self, path: &StorePath, field: &str, delta: i64) -> Result<i64> {
        self.mutate(path, |tree| tree.increment(path, field, delta)).await
    }

    /// Subscribe to change announcements.
    pub fn subscribe(&self) -> broadcast::Receiver<StorePath> {
        self.inner.changes.subscribe()
    }

    async fn mutate<T>(&self, path: &StorePath, apply: impl FnOnce(&mut Tree) -> Result<T>) -> Result<T> {
        let mut tree = self.inner.tree.lock().await;
        let result = apply(&mut tree)?;
        if let Some(ref data_file) = self.inner.data_file {
            persist(data_file, &tree)?;
        }
        debug!("Applied mutation at {}", path);
        // Announce while holding the lock so announcements follow mutation order.
        let _ = self.inner.changes.send(path.clone());
        Ok(result)
    }
}

/// Writes the snapshot through a temp file so a crash never leaves it half-written.
fn persist(data_file: &Path, tree: &Tree) -> Result<()> {
    let tmp = data_file.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(&tree.to_value())?)?;
    fs::rename(&tmp, data_file)?;
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
