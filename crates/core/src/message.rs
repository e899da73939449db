// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Message types.
//!
//! A message starts life as an optimistic local entry with a temporary id and
//! a provisional sequence number. Once the store accepts the write it carries
//! a permanent id and the sequence number allocated for it; from then on only
//! its delivery state and read flag change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::conversation::ConversationId;
use crate::error::{Error, Result};

const LOCAL_PREFIX: &str = "local-";

/// Identifier of a message within its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps an id read from the store.
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    /// Temporary id for an optimistic entry.
    pub fn local(n: u64) -> Self {
        MessageId(format!("{LOCAL_PREFIX}{n}"))
    }

    /// Permanent id for a confirmed message.
    ///
    /// Format: `m{sequence:08}-{hash}`, so store keys sort in sequence order.
    pub fn permanent(
        conversation_id: &ConversationId,
        sequence: u64,
        sender_id: &str,
        created_at: &DateTime<Utc>,
    ) -> Self {
        let input = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            conversation_id,
            sequence,
            sender_id,
            created_at.timestamp_millis()
        );
        let hash = Sha256::digest(input.as_bytes());
        MessageId(format!("m{:08}-{}", sequence, hex::encode(&hash[..4])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for temporary ids assigned before confirmation.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two sides of the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Renter,
    Owner,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Renter => "renter",
            SenderRole::Owner => "owner",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SenderRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "renter" => Ok(SenderRole::Renter),
            "owner" => Ok(SenderRole::Owner),
            _ => Err(Error::InvalidInput(format!(
                "invalid sender role: '{s}'\n  hint: valid roles are: renter, owner"
            ))),
        }
    }
}

/// Discriminant of [`MessageBody`], as stored in `messageType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Emoji,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Emoji => "emoji",
            MessageType::File => "file",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptor of an uploaded file. The bytes live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Emoji(String),
    File {
        attachment: Attachment,
        caption: Option<String>,
    },
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        MessageBody::Text(text.into())
    }

    pub fn emoji(emoji: impl Into<String>) -> Self {
        MessageBody::Emoji(emoji.into())
    }

    pub fn file(attachment: Attachment) -> Self {
        MessageBody::File { attachment, caption: None }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            MessageBody::Text(_) => MessageType::Text,
            MessageBody::Emoji(_) => MessageType::Emoji,
            MessageBody::File { .. } => MessageType::File,
        }
    }

    /// One-line preview for conversation lists, cut to `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        let full = match self {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Emoji(emoji) => emoji.clone(),
            MessageBody::File { attachment, caption: Some(caption) } => {
                format!("[file] {}: {}", attachment.name, caption)
            }
            MessageBody::File { attachment, caption: None } => format!("[file] {}", attachment.name),
        };
        truncate_chars(&full.replace(['\n', '\r'], " "), max_chars)
    }

    fn validate(&self) -> Result<()> {
        match self {
            MessageBody::Text(text) if text.trim().is_empty() => {
                Err(Error::InvalidInput("message text cannot be empty".to_string()))
            }
            MessageBody::Emoji(emoji) if emoji.trim().is_empty() => {
                Err(Error::InvalidInput("emoji cannot be empty".to_string()))
            }
            MessageBody::File { attachment, .. } if attachment.url.trim().is_empty() => {
                Err(Error::InvalidInput("attachment url cannot be empty".to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// What the user composed, before the engine stamps ids and order onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub body: MessageBody,
}

impl Draft {
    /// Creates a draft, rejecting empty payloads.
    pub fn new(body: MessageBody) -> Result<Self> {
        body.validate()?;
        Ok(Draft { body })
    }

    pub fn text(text: impl Into<String>) -> Result<Self> {
        Self::new(MessageBody::text(text))
    }
}

/// Delivery state of a message as seen by its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Written locally, waiting for the store.
    Sending,
    /// Accepted by the store.
    Sent,
    /// The write failed. The entry stays visible until resent.
    Failed,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Sending => "sending",
            DeliveryState::Sent => "sent",
            DeliveryState::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// Total order within the conversation.
    pub sequence: u64,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub receiver_id: String,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
    pub delivery: DeliveryState,
    pub is_read: bool,
}

impl Message {
    pub fn kind(&self) -> MessageType {
        self.body.kind()
    }

    /// Returns true if both entries describe the same logical send.
    ///
    /// Used to retire an optimistic entry once its confirmed twin appears.
    pub fn same_send_as(&self, other: &Message) -> bool {
        self.sender_id == other.sender_id
            && self.created_at.timestamp_millis() == other.created_at.timestamp_millis()
            && self.body == other.body
    }

    /// Ordering key: sequence first, then id for determinism.
    pub fn order_key(&self) -> (u64, &MessageId) {
        (self.sequence, &self.id)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
