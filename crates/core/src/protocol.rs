// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol between the sync engine and the relay store.
//!
//! Every client request carries an `id` that the server echoes in its reply.
//! A subscription is identified by the id of the `subscribe` request that
//! opened it, so the client can route `change` pushes before the
//! `subscribed` reply arrives.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::path::StorePath;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Read the value at a path once.
    Read { id: u64, path: StorePath },

    /// Replace the value at a path. `null` deletes.
    Write { id: u64, path: StorePath, value: Value },

    /// Shallow merge into the object at a path.
    Update {
        id: u64,
        path: StorePath,
        fields: Map<String, Value>,
    },

    /// Atomically add `delta` to an integer field.
    Increment {
        id: u64,
        path: StorePath,
        field: String,
        delta: i64,
    },

    /// Start receiving the value at a path whenever it changes.
    Subscribe { id: u64, path: StorePath },

    /// Stop a subscription opened by the `subscribe` request with id `subscription`.
    Unsubscribe { id: u64, subscription: u64 },

    /// Keepalive.
    Ping { id: u64 },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to `read`. `None` when nothing is stored.
    Value { id: u64, value: Option<Value> },

    /// Reply to `write`, `update`, and `unsubscribe`.
    Ack { id: u64 },

    /// Reply to `increment` with the new value.
    Counter { id: u64, value: i64 },

    /// Reply to `subscribe` with the current value.
    Subscribed { id: u64, value: Option<Value> },

    /// Pushed when a subscribed path changes.
    Change { subscription: u64, value: Option<Value> },

    /// A request failed. `id` is absent when the request could not be parsed.
    Error {
        id: Option<u64>,
        kind: ErrorKind,
        message: String,
    },

    /// Reply to `ping`.
    Pong { id: u64 },
}

/// Failure class carried by [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    Malformed,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    /// Classifies a store error for the wire.
    pub fn of(error: &Error) -> Self {
        match error {
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::MalformedRecord { .. } | Error::Json(_) => ErrorKind::Malformed,
            Error::InvalidPath(_) | Error::InvalidInput(_) => ErrorKind::InvalidRequest,
            _ => ErrorKind::Internal,
        }
    }

    /// Rebuilds a client-side error from a server reply.
    pub fn into_error(self, message: String) -> Error {
        match self {
            ErrorKind::PermissionDenied => Error::PermissionDenied(message),
            ErrorKind::Malformed => Error::MalformedRecord {
                path: String::new(),
                reason: message,
            },
            ErrorKind::InvalidRequest => Error::InvalidInput(message),
            ErrorKind::Internal => Error::TransientNetwork(message),
        }
    }
}

impl ClientMessage {
    /// Request id echoed by the server.
    pub fn id(&self) -> u64 {
        match self {
            ClientMessage::Read { id, .. }
            | ClientMessage::Write { id, .. }
            | ClientMessage::Update { id, .. }
            | ClientMessage::Increment { id, .. }
            | ClientMessage::Subscribe { id, .. }
            | ClientMessage::Unsubscribe { id, .. }
            | ClientMessage::Ping { id } => *id,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates an Error reply for a failed request.
    pub fn error(id: Option<u64>, error: &Error) -> Self {
        ServerMessage::Error {
            id,
            kind: ErrorKind::of(error),
            message: error.to_string(),
        }
    }

    /// The request this message answers, if it is a reply.
    pub fn reply_to(&self) -> Option<u64> {
        match self {
            ServerMessage::Value { id, .. }
            | ServerMessage::Ack { id }
            | ServerMessage::Counter { id, .. }
            | ServerMessage::Subscribed { id, .. }
            | ServerMessage::Pong { id } => Some(*id),
            ServerMessage::Error { id, .. } => *id,
            ServerMessage::Change { .. } => None,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
