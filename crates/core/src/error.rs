// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for leasechat operations.

use thiserror::Error;

/// All possible errors that can occur in leasechat operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A store call failed in flight. The mutation may or may not have landed.
    #[error("network error (state unknown): {0}")]
    TransientNetwork(String),

    #[error("not authenticated\n  hint: initialize the engine with a signed-in user first")]
    NotAuthenticated,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("malformed record at '{path}': {reason}")]
    MalformedRecord { path: String, reason: String },

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("invalid store path '{0}'\n  hint: segments must be non-empty and must not contain '.', '#', '$', '[', ']'")]
    InvalidPath(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::MalformedRecord`].
    pub fn malformed(path: impl ToString, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if the failure leaves the remote state unknown.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientNetwork(_))
    }

    /// Returns true if the store rejected the call for lack of permission.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::PermissionDenied(_))
    }
}

/// A specialized Result type for leasechat operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
