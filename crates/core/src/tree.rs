// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory JSON tree addressed by [`StorePath`].
//!
//! This is the state behind both the in-process store and the relay server.
//! Writing `null` deletes, and objects left empty by a delete are pruned so
//! that absent and empty read the same way.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::path::StorePath;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    root: Map<String, Value>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from a persisted snapshot. Anything other than an object is empty.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(root) => Tree { root },
            _ => Tree::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Returns the value at `path`, or `None` when nothing is stored there.
    pub fn get(&self, path: &StorePath) -> Option<&Value> {
        let mut segments = path.segments().iter();
        let mut node = self.root.get(segments.next()?)?;
        for segment in segments {
            node = node.as_object()?.get(segment)?;
        }
        Some(node)
    }

    /// Cloned value at `path`; the root reads as the whole tree.
    pub fn read(&self, path: &StorePath) -> Option<Value> {
        if path.is_root() {
            return if self.root.is_empty() { None } else { Some(self.to_value()) };
        }
        self.get(path).cloned()
    }

    /// Replaces the value at `path`, creating intermediate objects.
    ///
    /// `Value::Null` removes the entry.
    pub fn set(&mut self, path: &StorePath, value: Value) -> Result<()> {
        if path.is_root() {
            self.root = match value {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                _ => return Err(Error::InvalidInput("the root must be an object".to_string())),
            };
            return Ok(());
        }
        if value.is_null() {
            remove(&mut self.root, path.segments());
            return Ok(());
        }
        insert(&mut self.root, path.segments(), value);
        Ok(())
    }

    /// Shallow merge of `fields` into the object at `path`.
    ///
    /// A `null` field deletes that child. A non-object value at `path` is replaced.
    pub fn merge(&mut self, path: &StorePath, fields: Map<String, Value>) -> Result<()> {
        for (key, value) in fields {
            let child = path.child(&key)?;
            self.set(&child, value)?;
        }
        Ok(())
    }

    /// Adds `delta` to the integer at `path/field` and returns the new value.
    ///
    /// A missing field counts as zero.
    pub fn increment(&mut self, path: &StorePath, field: &str, delta: i64) -> Result<i64> {
        let target = path.child(field)?;
        let current = match self.get(&target) {
            None => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| Error::malformed(&target, format!("expected an integer, found {value}")))?,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| Error::malformed(&target, "counter overflow"))?;
        self.set(&target, Value::from(next))?;
        Ok(next)
    }
}

/// Inserts at `segments`, replacing non-objects and creating missing nodes on the way.
fn insert(node: &mut Map<String, Value>, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            node.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let entry = node
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert(child, rest, value);
            }
        }
    }
}

/// Removes the entry at `segments`. Returns true if `node` is left empty.
fn remove(node: &mut Map<String, Value>, segments: &[String]) -> bool {
    match segments {
        [] => false,
        [last] => {
            node.remove(last);
            node.is_empty()
        }
        [first, rest @ ..] => {
            let emptied = match node.get_mut(first) {
                Some(Value::Object(child)) => remove(child, rest),
                _ => false,
            };
            if emptied {
                node.remove(first);
            }
            node.is_empty()
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
