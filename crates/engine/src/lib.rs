// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! lc-engine: conversation and presence synchronization for leasechat
//!
//! The engine keeps per-conversation message logs ordered by sequence number,
//! reconciles optimistic sends with what the store confirms, maintains
//! per-reader unread counts, and tracks online/offline presence. Everything
//! is specified against the [`RemoteSyncClient`] trait; [`MemoryStore`] and
//! [`WebSocketStore`] implement it.

pub mod config;
pub mod directory;
pub mod engine;
mod listeners;
pub mod messages;
pub mod presence;
pub mod scope;
pub mod store;
pub mod unread;

pub use config::{EngineConfig, RemoteConfig};
pub use directory::ConversationDirectory;
pub use engine::{ConversationSyncEngine, ConversationsCallback, MessagesCallback};
pub use messages::{MessageStore, Reservation, ResendTicket, SendOutcome};
pub use presence::{PresenceCallback, PresenceTracker};
pub use scope::Scope;
pub use store::{ChangeCallback, MemoryStore, RemoteSyncClient, Subscription, WebSocketStore};
pub use unread::{ReaderState, UnreadEffect, UnreadReconciler};

pub use lc_core::{Error, Result};
