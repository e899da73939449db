// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Hierarchical store paths.
//!
//! Paths are `/`-separated segment lists. The engine only ever builds the
//! layouts below through the typed constructors:
//!
//! ```text
//! users/{uid}/conversations/{conversationId}
//! users/{uid}/online
//! conversations/{conversationId}/messages/{messageId}
//! conversations/{conversationId}/meta
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const FORBIDDEN: &[char] = &['/', '.', '#', '$', '[', ']'];

/// A validated path into the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The root of the tree.
    pub fn root() -> Self {
        StorePath { segments: Vec::new() }
    }

    /// Builds a path from segments, validating each one.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            validate_segment(segment).map_err(|_| Error::InvalidPath(segments.join("/")))?;
        }
        Ok(StorePath { segments })
    }

    /// Appends one segment.
    pub fn child(&self, segment: &str) -> Result<Self> {
        validate_segment(segment)
            .map_err(|_| Error::InvalidPath(format!("{}/{}", self, segment)))?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(StorePath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the final segment, if any.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Returns true if `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &StorePath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// Returns true if a change at `self` can alter the value observed at `watched`.
    ///
    /// That is the case when one path is a prefix of the other.
    pub fn affects(&self, watched: &StorePath) -> bool {
        self.starts_with(watched) || watched.starts_with(self)
    }

    /// `users/{uid}/conversations`
    pub fn user_conversations(uid: &str) -> Result<Self> {
        Self::from_segments(["users", uid, "conversations"])
    }

    /// `users/{uid}/conversations/{conversationId}`
    pub fn conversation_entry(uid: &str, conversation_id: &str) -> Result<Self> {
        Self::from_segments(["users", uid, "conversations", conversation_id])
    }

    /// `users/{uid}/online`
    pub fn presence(uid: &str) -> Result<Self> {
        Self::from_segments(["users", uid, "online"])
    }

    /// `conversations/{conversationId}/messages`
    pub fn messages(conversation_id: &str) -> Result<Self> {
        Self::from_segments(["conversations", conversation_id, "messages"])
    }

    /// `conversations/{conversationId}/messages/{messageId}`
    pub fn message(conversation_id: &str, message_id: &str) -> Result<Self> {
        Self::from_segments(["conversations", conversation_id, "messages", message_id])
    }

    /// `conversations/{conversationId}/meta`
    pub fn conversation_meta(conversation_id: &str) -> Result<Self> {
        Self::from_segments(["conversations", conversation_id, "meta"])
    }
}

fn validate_segment(segment: &str) -> std::result::Result<(), ()> {
    if segment.is_empty() || segment.contains(FORBIDDEN) || segment.chars().any(char::is_control)
    {
        return Err(());
    }
    Ok(())
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for StorePath {
    type Err = Error;

    /// Parses `a/b/c`. Leading and trailing slashes are ignored; `""` and `"/"` are the root.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(StorePath::root());
        }
        Self::from_segments(trimmed.split('/')).map_err(|_| Error::InvalidPath(s.to_string()))
    }
}

impl TryFrom<String> for StorePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> String {
        path.to_string()
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
