// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! lc-core: Shared library for leasechat
//!
//! This crate provides the domain types, wire records, store paths, and the
//! relay protocol used by both the sync engine and the relay server.

pub mod clock;
pub mod conversation;
pub mod error;
pub mod message;
pub mod path;
pub mod presence;
pub mod protocol;
pub mod schema;
pub mod tree;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use conversation::{sort_for_list, Contact, Conversation, ConversationId, CurrentUser, LastMessage};
pub use error::{Error, Result};
pub use message::{
    Attachment, DeliveryState, Draft, Message, MessageBody, MessageId, MessageType, SenderRole,
};
pub use path::StorePath;
pub use presence::{Presence, PresenceStatus};
pub use tree::Tree;
