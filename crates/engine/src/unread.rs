// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Unread counting per (conversation, owning user).
//!
//! A conversation is either `idle` or `viewing`. The reconciler is a pure
//! state machine: each transition or observed snapshot returns the writes the
//! engine must perform, as [`UnreadEffect`]s. The engine serializes every call
//! behind its reconcile lock, so the remote-driven count path and the
//! local-driven reset path never interleave.
//!
//! Counts use set semantics: the count is the number of counterparty messages
//! that are neither read in the store nor acknowledged locally. A message
//! therefore counts once no matter how many snapshots repeat it.

use std::collections::{BTreeSet, HashMap, HashSet};

use lc_core::{ConversationId, Message, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderState {
    #[default]
    Idle,
    Viewing,
}

/// A write the engine owes the store after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreadEffect {
    /// Set the owner's `unreadCount`.
    PersistCount(u32),
    /// Flag these messages `isRead`.
    MarkRead(Vec<MessageId>),
    /// Record the highest read sequence in the counterparty's entry.
    ReadReceipt(u64),
    /// Refresh the owner's last-message summary.
    RefreshSummary(Message),
}

#[derive(Debug, Default)]
struct Tracker {
    state: ReaderState,
    unread: BTreeSet<MessageId>,
    /// Marked read locally; the store may not reflect it yet.
    acknowledged: HashSet<MessageId>,
    /// Highest counterparty sequence observed; `None` until the first snapshot.
    high_water: Option<u64>,
    seeded: u32,
    persisted: Option<u32>,
    last_receipt: Option<u64>,
}

impl Tracker {
    fn count(&self) -> u32 {
        match self.high_water {
            Some(_) => u32::try_from(self.unread.len()).unwrap_or(u32::MAX),
            None => self.seeded,
        }
    }

    fn persist(&mut self, effects: &mut Vec<UnreadEffect>, force: bool) {
        let count = self.count();
        if force || self.persisted != Some(count) {
            self.persisted = Some(count);
            effects.push(UnreadEffect::PersistCount(count));
        }
    }

    /// Acknowledges every unread counterparty message and emits the read
    /// writes for them.
    fn read_all(&mut self, incoming: &[&Message], effects: &mut Vec<UnreadEffect>) {
        let ids: Vec<MessageId> = incoming
            .iter()
            .filter(|m| !m.is_read && !self.acknowledged.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        self.unread.clear();
        if !ids.is_empty() {
            self.acknowledged.extend(ids.iter().cloned());
            effects.push(UnreadEffect::MarkRead(ids));
        }
        if let Some(newest) = incoming.iter().map(|m| m.sequence).max() {
            if self.last_receipt.is_none_or(|last| newest > last) {
                self.last_receipt = Some(newest);
                effects.push(UnreadEffect::ReadReceipt(newest));
            }
        }
    }

    fn advance_high_water(&mut self, incoming: &[&Message]) -> Option<u64> {
        let previous = self.high_water;
        let newest = incoming.iter().map(|m| m.sequence).max().unwrap_or(0);
        self.high_water = Some(previous.unwrap_or(0).max(newest));
        previous
    }
}

/// Unread state for every conversation of one user.
#[derive(Debug, Default)]
pub struct UnreadReconciler {
    user_id: String,
    trackers: HashMap<ConversationId, Tracker>,
}

impl UnreadReconciler {
    pub fn new(user_id: impl Into<String>) -> Self {
        UnreadReconciler { user_id: user_id.into(), trackers: HashMap::new() }
    }

    /// Drops all state and starts over for `user_id`.
    pub fn reset(&mut self, user_id: impl Into<String>) {
        *self = Self::new(user_id);
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Adopts the persisted count for a conversation whose messages have not
    /// been observed yet.
    pub fn seed(&mut self, conversation_id: &ConversationId, count: u32) {
        let tracker = self.trackers.entry(conversation_id.clone()).or_default();
        if tracker.high_water.is_none() {
            tracker.seeded = count;
            tracker.persisted = Some(count);
        }
    }

    pub fn state(&self, conversation_id: &ConversationId) -> ReaderState {
        self.trackers.get(conversation_id).map(|t| t.state).unwrap_or_default()
    }

    pub fn unread_count(&self, conversation_id: &ConversationId) -> u32 {
        self.trackers.get(conversation_id).map(Tracker::count).unwrap_or(0)
    }

    /// `idle -> viewing`: the count drops to zero and every counterparty
    /// message is marked read. The reset is always written.
    pub fn enter_viewing(&mut self, conversation_id: &ConversationId, messages: &[Message]) -> Vec<UnreadEffect> {
        let incoming = self.incoming(messages);
        let tracker = self.trackers.entry(conversation_id.clone()).or_default();
        tracker.state = ReaderState::Viewing;
        tracker.advance_high_water(&incoming);

        let mut effects = Vec::new();
        tracker.read_all(&incoming, &mut effects);
        tracker.persist(&mut effects, true);
        effects
    }

    /// `viewing -> idle`: no count change, only a confirmatory reset write.
    pub fn leave_viewing(&mut self, conversation_id: &ConversationId) -> Vec<UnreadEffect> {
        let tracker = self.trackers.entry(conversation_id.clone()).or_default();
        if tracker.state != ReaderState::Viewing {
            return Vec::new();
        }
        tracker.state = ReaderState::Idle;
        let mut effects = Vec::new();
        tracker.persist(&mut effects, true);
        effects
    }

    /// Marks everything read without changing the reader state.
    pub fn mark_as_read(&mut self, conversation_id: &ConversationId, messages: &[Message]) -> Vec<UnreadEffect> {
        let incoming = self.incoming(messages);
        let tracker = self.trackers.entry(conversation_id.clone()).or_default();
        tracker.advance_high_water(&incoming);

        let mut effects = Vec::new();
        tracker.read_all(&incoming, &mut effects);
        tracker.persist(&mut effects, true);
        effects
    }

    /// Applies a confirmed snapshot of the conversation's messages.
    pub fn observe(&mut self, conversation_id: &ConversationId, messages: &[Message]) -> Vec<UnreadEffect> {
        let incoming = self.incoming(messages);
        let tracker = self.trackers.entry(conversation_id.clone()).or_default();

        for message in &incoming {
            if message.is_read {
                tracker.acknowledged.remove(&message.id);
            }
        }
        let previous = tracker.advance_high_water(&incoming);

        let mut effects = Vec::new();
        match tracker.state {
            ReaderState::Viewing => {
                tracker.read_all(&incoming, &mut effects);
            }
            ReaderState::Idle => {
                tracker.unread = incoming
                    .iter()
                    .filter(|m| !m.is_read && !tracker.acknowledged.contains(&m.id))
                    .map(|m| m.id.clone())
                    .collect();
                if let Some(seen) = previous {
                    let newest = incoming
                        .iter()
                        .filter(|m| m.sequence > seen)
                        .max_by_key(|m| m.sequence);
                    if let Some(newest) = newest {
                        effects.push(UnreadEffect::RefreshSummary((*newest).clone()));
                    }
                }
            }
        }
        tracker.persist(&mut effects, false);
        effects
    }

    /// Forgets what was last written so the next transition rewrites it.
    pub fn invalidate(&mut self, conversation_id: &ConversationId) {
        if let Some(tracker) = self.trackers.get_mut(conversation_id) {
            tracker.persisted = None;
        }
    }

    fn incoming<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        messages.iter().filter(|m| m.sender_id != self.user_id).collect()
    }
}

#[cfg(test)]
#[path = "unread_tests.rs"]
mod tests;
