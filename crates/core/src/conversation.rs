// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation directory types.
//!
//! Each participant owns a separate projection of a conversation (their own
//! directory entry), because unread counts and read receipts differ per
//! reader even though both entries point at the same message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::message::SenderRole;

/// Identifier of a 1:1 conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        ConversationId(id.into())
    }

    /// Derives the id shared by both participants.
    ///
    /// Symmetric in the two user ids; distinct listings give distinct
    /// conversations between the same pair.
    /// Format: `c-{hash}` with the first 16 hex chars of SHA-256.
    pub fn derive(user_a: &str, user_b: &str, listing_id: Option<&str>) -> Self {
        let (lo, hi) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };
        let input = format!("{}\u{1f}{}\u{1f}{}", lo, hi, listing_id.unwrap_or(""));
        let hash = Sha256::digest(input.as_bytes());
        ConversationId(format!("c-{}", hex::encode(&hash[..8])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user as shown to their counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl Contact {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Contact { id: id.into(), name: name.into(), avatar: None }
    }
}

/// The signed-in user the engine acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub contact: Contact,
    pub role: SenderRole,
}

impl CurrentUser {
    /// Fails with [`Error::NotAuthenticated`] when there is no user id.
    pub fn new(contact: Contact, role: SenderRole) -> Result<Self> {
        if contact.id.trim().is_empty() {
            return Err(Error::NotAuthenticated);
        }
        Ok(CurrentUser { contact, role })
    }

    pub fn id(&self) -> &str {
        &self.contact.id
    }
}

/// Denormalized summary of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMessage {
    pub preview: String,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub sent_at: DateTime<Utc>,
    /// Sequence of the summarized message, when known.
    pub sequence: Option<u64>,
}

/// One user's directory entry for a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// The user this projection belongs to.
    pub owner_id: String,
    pub contact: Contact,
    pub listing_id: Option<String>,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    /// Highest sequence the counterparty has read.
    pub counterparty_read_sequence: Option<u64>,
}

impl Conversation {
    /// A fresh entry with no messages.
    pub fn empty(id: ConversationId, owner_id: &str, contact: Contact, listing_id: Option<String>) -> Self {
        Conversation {
            id,
            owner_id: owner_id.to_string(),
            contact,
            listing_id,
            last_message: None,
            unread_count: 0,
            counterparty_read_sequence: None,
        }
    }

    pub fn last_message_time(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().map(|m| m.sent_at)
    }

    /// Returns true if the owner sent the newest message and the counterparty has read it.
    pub fn last_message_seen_by_counterparty(&self) -> bool {
        match (&self.last_message, self.counterparty_read_sequence) {
            (Some(last), Some(read)) => {
                last.sender_id == self.owner_id && last.sequence.is_some_and(|seq| read >= seq)
            }
            _ => false,
        }
    }
}

/// Conversation list order.
///
/// Unread conversations first, then newest last message first (entries
/// without messages last), ties broken by conversation id.
pub fn list_order(a: &Conversation, b: &Conversation) -> Ordering {
    let a_unread = a.unread_count > 0;
    let b_unread = b.unread_count > 0;
    b_unread
        .cmp(&a_unread)
        .then_with(|| b.last_message_time().cmp(&a.last_message_time()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts conversations for display with [`list_order`].
pub fn sort_for_list(conversations: &mut [Conversation]) {
    conversations.sort_by(list_order);
}

#[cfg(test)]
#[path = "conversation_tests.rs"]
mod tests;
