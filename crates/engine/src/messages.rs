// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-conversation message logs with an optimistic overlay.
//!
//! Each log holds the messages confirmed by the store plus the local sends
//! that are still pending (sending or failed). The merged view orders
//! everything by sequence number; a pending entry sorts after a confirmed
//! one with the same sequence. Remote entries always win: once the confirmed
//! copy of a pending send shows up, the pending entry is dropped. Failed
//! entries stay until resent or retired by their reserved id.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use lc_core::{
    ConversationId, CurrentUser, DeliveryState, Draft, Error, Message, MessageId, Result,
};

/// A sequence number reserved in the store for a pending send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: MessageId,
    pub sequence: u64,
}

/// How a send ended.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The store accepted the message as given.
    Sent(Message),
    /// The write failed or its outcome is unknown.
    Failed,
}

/// A failed send taken back for another attempt.
#[derive(Debug, Clone)]
pub struct ResendTicket {
    /// The entry, back in `sending`.
    pub message: Message,
    pub draft: Draft,
    /// Sequence already allocated by the failed attempt, if it got that far.
    pub reservation: Option<Reservation>,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    message: Message,
    draft: Draft,
    reservation: Option<Reservation>,
}

impl PendingEntry {
    /// Finds the remote message that retires this entry, if any.
    ///
    /// A reserved entry is only retired by its reserved id. Content matching
    /// applies to unreserved entries still in `sending`, and only against
    /// remote messages no other entry or confirmed copy already accounts for.
    fn superseding_id(&self, remote: &[Message], claimed: &HashSet<MessageId>) -> Option<MessageId> {
        if let Some(reservation) = &self.reservation {
            return remote.iter().find(|r| r.id == reservation.id).map(|r| r.id.clone());
        }
        if let Some(r) = remote.iter().find(|r| r.id == self.message.id) {
            return Some(r.id.clone());
        }
        if self.message.delivery != DeliveryState::Sending {
            return None;
        }
        remote
            .iter()
            .find(|r| !claimed.contains(&r.id) && r.same_send_as(&self.message))
            .map(|r| r.id.clone())
    }
}

#[derive(Debug, Default)]
struct ConversationLog {
    confirmed: BTreeMap<MessageId, Message>,
    pending: Vec<PendingEntry>,
}

impl ConversationLog {
    fn last_known_sequence(&self) -> u64 {
        let confirmed = self.confirmed.values().map(|m| m.sequence).max().unwrap_or(0);
        let pending = self.pending.iter().map(|p| p.message.sequence).max().unwrap_or(0);
        confirmed.max(pending)
    }

    fn merged(&self) -> Vec<Message> {
        let mut merged: Vec<(u64, bool, Message)> = self
            .confirmed
            .values()
            .map(|m| (m.sequence, false, m.clone()))
            .chain(self.pending.iter().map(|p| (p.message.sequence, true, p.message.clone())))
            .collect();
        merged.sort_by(|a, b| (a.0, a.1, &a.2.id).cmp(&(b.0, b.1, &b.2.id)));
        merged.into_iter().map(|(_, _, m)| m).collect()
    }

    fn pending_mut(&mut self, local_id: &MessageId) -> Result<&mut PendingEntry> {
        self.pending
            .iter_mut()
            .find(|p| &p.message.id == local_id)
            .ok_or_else(|| Error::MessageNotFound(local_id.to_string()))
    }
}

/// Message logs for every conversation the engine has seen.
#[derive(Debug, Default)]
pub struct MessageStore {
    logs: HashMap<ConversationId, ConversationLog>,
    next_local: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a local entry in `sending` with a temporary id and the provisional
    /// sequence `last_known_sequence + 1`.
    pub fn append_optimistic(
        &mut self,
        conversation_id: &ConversationId,
        draft: Draft,
        sender: &CurrentUser,
        receiver_id: &str,
        now: DateTime<Utc>,
    ) -> Message {
        self.next_local += 1;
        let log = self.logs.entry(conversation_id.clone()).or_default();
        let message = Message {
            id: MessageId::local(self.next_local),
            conversation_id: conversation_id.clone(),
            sequence: log.last_known_sequence() + 1,
            sender_id: sender.id().to_string(),
            sender_role: sender.role,
            receiver_id: receiver_id.to_string(),
            body: draft.body.clone(),
            created_at: now,
            delivery: DeliveryState::Sending,
            is_read: false,
        };
        log.pending.push(PendingEntry {
            message: message.clone(),
            draft,
            reservation: None,
        });
        message
    }

    /// Records the sequence allocated for a pending send.
    pub fn reserve(
        &mut self,
        conversation_id: &ConversationId,
        local_id: &MessageId,
        reservation: Reservation,
    ) -> Result<()> {
        let entry = self.log_mut(conversation_id)?.pending_mut(local_id)?;
        entry.message.sequence = reservation.sequence;
        entry.reservation = Some(reservation);
        Ok(())
    }

    /// Resolves a pending send.
    ///
    /// `Sent` replaces the entry with the confirmed message (unless a
    /// snapshot already delivered it); `Failed` leaves it visible as failed.
    pub fn confirm(
        &mut self,
        conversation_id: &ConversationId,
        local_id: &MessageId,
        outcome: SendOutcome,
    ) -> Result<Message> {
        let log = self.log_mut(conversation_id)?;
        match outcome {
            SendOutcome::Sent(mut message) => {
                let index = log.pending.iter().position(|p| &p.message.id == local_id);
                if let Some(index) = index {
                    log.pending.remove(index);
                }
                message.delivery = DeliveryState::Sent;
                let stored = log
                    .confirmed
                    .entry(message.id.clone())
                    .or_insert(message)
                    .clone();
                debug!(conversation = %conversation_id, message = %stored.id, sequence = stored.sequence, "send confirmed");
                Ok(stored)
            }
            SendOutcome::Failed => {
                let entry = log.pending_mut(local_id)?;
                entry.message.delivery = DeliveryState::Failed;
                Ok(entry.message.clone())
            }
        }
    }

    /// Merges a remote snapshot of the conversation's messages and returns the merged view.
    ///
    /// Idempotent: applying the same snapshot twice yields the same result.
    pub fn reconcile_snapshot(
        &mut self,
        conversation_id: &ConversationId,
        remote: Vec<Message>,
    ) -> Vec<Message> {
        let log = self.logs.entry(conversation_id.clone()).or_default();
        let mut claimed: HashSet<MessageId> = log.confirmed.keys().cloned().collect();
        claimed.extend(log.pending.iter().filter_map(|p| p.reservation.as_ref().map(|r| r.id.clone())));
        log.pending.retain(|p| match p.superseding_id(&remote, &claimed) {
            Some(id) => {
                claimed.insert(id);
                false
            }
            None => true,
        });
        for message in remote {
            log.confirmed.insert(message.id.clone(), message);
        }
        log.merged()
    }

    /// Takes a failed send back for another attempt. It keeps its local id
    /// and any reserved sequence.
    pub fn resend(
        &mut self,
        conversation_id: &ConversationId,
        local_id: &MessageId,
    ) -> Result<ResendTicket> {
        let log = self.log_mut(conversation_id)?;
        let next_sequence = log.last_known_sequence() + 1;
        let entry = log.pending_mut(local_id)?;
        if entry.message.delivery != DeliveryState::Failed {
            return Err(Error::InvalidInput(format!(
                "message {local_id} is {}, only failed messages can be resent",
                entry.message.delivery
            )));
        }
        entry.message.delivery = DeliveryState::Sending;
        entry.message.sequence = match entry.reservation {
            Some(ref reservation) => reservation.sequence,
            None => next_sequence,
        };
        Ok(ResendTicket {
            message: entry.message.clone(),
            draft: entry.draft.clone(),
            reservation: entry.reservation.clone(),
        })
    }

    /// Flags confirmed messages as read ahead of the next snapshot.
    pub fn mark_read_local(&mut self, conversation_id: &ConversationId, ids: &[MessageId]) {
        if let Some(log) = self.logs.get_mut(conversation_id) {
            for id in ids {
                if let Some(message) = log.confirmed.get_mut(id) {
                    message.is_read = true;
                }
            }
        }
    }

    /// Confirmed and pending messages in display order.
    pub fn merged(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.logs.get(conversation_id).map(ConversationLog::merged).unwrap_or_default()
    }

    /// Confirmed messages only, in sequence order.
    pub fn confirmed(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut confirmed: Vec<Message> = self
            .logs
            .get(conversation_id)
            .map(|log| log.confirmed.values().cloned().collect())
            .unwrap_or_default();
        confirmed.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        confirmed
    }

    pub fn last_known_sequence(&self, conversation_id: &ConversationId) -> u64 {
        self.logs.get(conversation_id).map(ConversationLog::last_known_sequence).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }

    fn log_mut(&mut self, conversation_id: &ConversationId) -> Result<&mut ConversationLog> {
        self.logs
            .get_mut(conversation_id)
            .ok_or_else(|| Error::ConversationNotFound(conversation_id.to_string()))
    }
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
