// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire records for every store path the engine reads or writes.
//!
//! Remote snapshots are untyped JSON. Everything passes through the structs
//! here before reaching the engine; entries that fail validation are
//! quarantined (reported back as errors next to the good entries) instead of
//! leaking half-filled values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::from_millis;
use crate::conversation::{Contact, Conversation, ConversationId, LastMessage};
use crate::error::{Error, Result};
use crate::message::{Attachment, DeliveryState, Message, MessageBody, MessageId, MessageType, SenderRole};
use crate::path::StorePath;
use crate::presence::{Presence, PresenceStatus};

/// `conversations/{conversationId}/messages/{messageId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub sequential_id: u64,
    pub sender_id: String,
    pub receiver_id: String,
    pub sender_type: SenderRole,
    pub message_type: MessageType,
    /// Text body, or the caption of a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<Attachment>,
    /// Milliseconds since Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub is_read: bool,
}

impl MessageRecord {
    pub fn from_message(message: &Message) -> Self {
        let (text, emoji, file_data) = match &message.body {
            MessageBody::Text(text) => (Some(text.clone()), None, None),
            MessageBody::Emoji(emoji) => (None, Some(emoji.clone()), None),
            MessageBody::File { attachment, caption } => (caption.clone(), None, Some(attachment.clone())),
        };
        MessageRecord {
            sequential_id: message.sequence,
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            sender_type: message.sender_role,
            message_type: message.kind(),
            text,
            emoji,
            file_data,
            timestamp: message.created_at.timestamp_millis(),
            is_read: message.is_read,
        }
    }

    /// Validates the payload against `messageType` and builds a confirmed message.
    pub fn into_message(
        self,
        conversation_id: &ConversationId,
        id: MessageId,
        path: &StorePath,
    ) -> Result<Message> {
        let body = match self.message_type {
            MessageType::Text => match self.text {
                Some(text) => MessageBody::Text(text),
                None => return Err(Error::malformed(path, "text message without text")),
            },
            MessageType::Emoji => match self.emoji {
                Some(emoji) => MessageBody::Emoji(emoji),
                None => return Err(Error::malformed(path, "emoji message without emoji")),
            },
            MessageType::File => match self.file_data {
                Some(attachment) => MessageBody::File { attachment, caption: self.text },
                None => return Err(Error::malformed(path, "file message without fileData")),
            },
        };
        if self.sequential_id == 0 {
            return Err(Error::malformed(path, "sequentialId must be positive"));
        }
        Ok(Message {
            id,
            conversation_id: conversation_id.clone(),
            sequence: self.sequential_id,
            sender_id: self.sender_id,
            sender_role: self.sender_type,
            receiver_id: self.receiver_id,
            body,
            created_at: from_millis(self.timestamp),
            delivery: DeliveryState::Sent,
            is_read: self.is_read,
        })
    }
}

/// `users/{uid}/conversations/{conversationId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub contact_id: String,
    pub contact_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub last_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sender_type: Option<SenderRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_read_sequence: Option<u64>,
    /// Signed on the wire so a bad writer cannot make the whole entry unreadable.
    #[serde(default)]
    pub unread_count: i64,
}

impl ConversationRecord {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        let last = conversation.last_message.as_ref();
        ConversationRecord {
            contact_id: conversation.contact.id.clone(),
            contact_name: conversation.contact.name.clone(),
            contact_avatar: conversation.contact.avatar.clone(),
            listing_id: conversation.listing_id.clone(),
            last_message: last.map(|m| m.preview.clone()).unwrap_or_default(),
            last_message_sender_id: last.map(|m| m.sender_id.clone()),
            last_message_sender_type: last.map(|m| m.sender_role),
            last_message_time: last.map(|m| m.sent_at.timestamp_millis()),
            last_message_sequence: last.and_then(|m| m.sequence),
            counterparty_read_sequence: conversation.counterparty_read_sequence,
            unread_count: i64::from(conversation.unread_count),
        }
    }

    pub fn into_conversation(self, owner_id: &str, id: ConversationId) -> Conversation {
        let last_message = match (self.last_message_sender_id, self.last_message_sender_type, self.last_message_time)
        {
            (Some(sender_id), Some(sender_role), Some(time)) => Some(LastMessage {
                preview: self.last_message,
                sender_id,
                sender_role,
                sent_at: from_millis(time),
                sequence: self.last_message_sequence,
            }),
            _ => None,
        };
        Conversation {
            id,
            owner_id: owner_id.to_string(),
            contact: Contact {
                id: self.contact_id,
                name: self.contact_name,
                avatar: self.contact_avatar,
            },
            listing_id: self.listing_id,
            last_message,
            unread_count: u32::try_from(self.unread_count.max(0)).unwrap_or(u32::MAX),
            counterparty_read_sequence: self.counterparty_read_sequence,
        }
    }
}

/// Partial update carrying a last-message summary.
pub fn summary_fields(last: &LastMessage) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("lastMessage".into(), Value::from(last.preview.clone()));
    fields.insert("lastMessageSenderId".into(), Value::from(last.sender_id.clone()));
    fields.insert("lastMessageSenderType".into(), Value::from(last.sender_role.as_str()));
    fields.insert("lastMessageTime".into(), Value::from(last.sent_at.timestamp_millis()));
    if let Some(sequence) = last.sequence {
        fields.insert("lastMessageSequence".into(), Value::from(sequence));
    }
    fields
}

/// Partial update setting an unread counter.
pub fn unread_fields(count: u32) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("unreadCount".into(), Value::from(count));
    fields
}

/// Partial update recording how far the counterparty has read.
pub fn read_receipt_fields(sequence: u64) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("counterpartyReadSequence".into(), Value::from(sequence));
    fields
}

/// Partial update flipping a message's read flag.
pub fn message_read_fields() -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("isRead".into(), Value::Bool(true));
    fields
}

/// `users/{uid}/online`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    /// Milliseconds since Unix epoch.
    pub last_seen: i64,
}

impl PresenceRecord {
    pub fn into_presence(self, user_id: &str) -> Presence {
        Presence {
            user_id: user_id.to_string(),
            status: self.status,
            last_seen: from_millis(self.last_seen),
        }
    }
}

/// `conversations/{conversationId}/meta`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaRecord {
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
}

/// Field of the meta record holding the last allocated sequence number.
pub const LAST_SEQUENCE_FIELD: &str = "lastSequence";

/// Decoded children of a collection snapshot.
#[derive(Debug, Default)]
pub struct Decoded<T> {
    pub items: Vec<T>,
    /// One error per child that failed validation.
    pub quarantined: Vec<Error>,
}

/// Serializes a record into the field map of a partial update.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!("record did not serialize to an object: {other}"))),
    }
}

/// Deserializes one record, turning schema errors into [`Error::MalformedRecord`].
pub fn decode_record<T: DeserializeOwned>(path: &StorePath, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| Error::malformed(path, e.to_string()))
}

/// Decodes a `conversations/{id}/messages` snapshot.
pub fn decode_messages(conversation_id: &ConversationId, path: &StorePath, value: Option<&Value>) -> Decoded<Message> {
    decode_children(path, value, |child_path, key, child| {
        let record: MessageRecord = decode_record(child_path, child)?;
        record.into_message(conversation_id, MessageId::new(key), child_path)
    })
}

/// Decodes a `users/{uid}/conversations` snapshot.
pub fn decode_conversations(owner_id: &str, path: &StorePath, value: Option<&Value>) -> Decoded<Conversation> {
    decode_children(path, value, |child_path, key, child| {
        let record: ConversationRecord = decode_record(child_path, child)?;
        Ok(record.into_conversation(owner_id, ConversationId::new(key)))
    })
}

/// Decodes a single `users/{uid}/conversations/{id}` entry.
pub fn decode_conversation(
    owner_id: &str,
    id: &ConversationId,
    path: &StorePath,
    value: &Value,
) -> Result<Conversation> {
    let record: ConversationRecord = decode_record(path, value)?;
    Ok(record.into_conversation(owner_id, id.clone()))
}

/// Decodes a `users/{uid}/online` record. Absent means never seen.
pub fn decode_presence(user_id: &str, path: &StorePath, value: Option<&Value>) -> Result<Option<Presence>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let record: PresenceRecord = decode_record(path, value)?;
            Ok(Some(record.into_presence(user_id)))
        }
    }
}

fn decode_children<T, F>(path: &StorePath, value: Option<&Value>, mut decode: F) -> Decoded<T>
where
    F: FnMut(&StorePath, &str, &Value) -> Result<T>,
{
    let mut decoded = Decoded { items: Vec::new(), quarantined: Vec::new() };
    let map = match value {
        None | Some(Value::Null) => return decoded,
        Some(Value::Object(map)) => map,
        Some(_) => {
            decoded.quarantined.push(Error::malformed(path, "expected an object of records"));
            return decoded;
        }
    };
    for (key, child) in map {
        let item = path.child(key).and_then(|child_path| decode(&child_path, key, child));
        match item {
            Ok(item) => decoded.items.push(item),
            Err(e) => decoded.quarantined.push(e),
        }
    }
    decoded
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
