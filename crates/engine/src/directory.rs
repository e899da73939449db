// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user conversation index.
//!
//! Every participant owns a projection of each conversation under
//! `users/{uid}/conversations/{conversationId}`. The projections carry the
//! counterparty contact, a denormalized last-message summary, and that
//! reader's unread count. All writes are partial-field updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, info, warn};

use lc_core::schema::{self, ConversationRecord, MetaRecord};
use lc_core::{
    sort_for_list, Contact, Conversation, ConversationId, CurrentUser, Error, LastMessage, Message, Result,
    StorePath,
};

use crate::store::RemoteSyncClient;

pub struct ConversationDirectory {
    store: Arc<dyn RemoteSyncClient>,
    summary_max_chars: usize,
    /// The signed-in user's conversations, as last listed or created.
    cache: Mutex<HashMap<ConversationId, Conversation>>,
}

impl ConversationDirectory {
    pub fn new(store: Arc<dyn RemoteSyncClient>, summary_max_chars: usize) -> Self {
        ConversationDirectory {
            store,
            summary_max_chars,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Finds or creates the conversation between `me` and `counterparty`
    /// about `listing_id`.
    ///
    /// Missing entries are created under both participants with zero unread
    /// and no last message. An existing counterparty entry is never touched.
    pub async fn get_or_create(
        &self,
        me: &CurrentUser,
        counterparty: &Contact,
        listing_id: Option<&str>,
    ) -> Result<Conversation> {
        if counterparty.id.trim().is_empty() {
            return Err(Error::InvalidInput("counterparty id cannot be empty".to_string()));
        }
        if counterparty.id == me.id() {
            return Err(Error::InvalidInput("cannot open a conversation with yourself".to_string()));
        }

        let id = ConversationId::derive(me.id(), &counterparty.id, listing_id);
        if let Some(cached) = self.cached(&id) {
            return Ok(cached);
        }

        let listing = listing_id.map(str::to_string);
        let mine = Conversation::empty(id.clone(), me.id(), counterparty.clone(), listing.clone());
        let mine = self.ensure_entry(mine).await?;
        let theirs = Conversation::empty(id.clone(), &counterparty.id, me.contact.clone(), listing.clone());
        self.ensure_entry(theirs).await?;

        let mut participants = vec![me.id().to_string(), counterparty.id.clone()];
        participants.sort();
        let meta = MetaRecord { participants, listing_id: listing };
        let meta_path = StorePath::conversation_meta(id.as_str())?;
        self.store.update(&meta_path, schema::to_fields(&meta)?).await?;

        self.cache_put(mine.clone());
        Ok(mine)
    }

    /// Creates the entry if it is absent and returns what is stored.
    async fn ensure_entry(&self, conversation: Conversation) -> Result<Conversation> {
        let path = StorePath::conversation_entry(&conversation.owner_id, conversation.id.as_str())?;
        if let Some(existing) = self.store.read_once(&path).await? {
            return schema::decode_conversation(&conversation.owner_id, &conversation.id, &path, &existing);
        }
        let fields = schema::to_fields(&ConversationRecord::from_conversation(&conversation))?;
        self.store.update(&path, fields).await?;
        info!(conversation = %conversation.id, owner = %conversation.owner_id, "created conversation entry");
        Ok(conversation)
    }

    /// Writes the summary of `message` into both participants' entries.
    ///
    /// Both writes are attempted; the first failure is returned.
    pub async fn update_last_message(&self, message: &Message) -> Result<()> {
        let last = self.summarize(message);
        let fields = schema::summary_fields(&last);

        let mut first_error = None;
        for owner in [&message.sender_id, &message.receiver_id] {
            let path = StorePath::conversation_entry(owner, message.conversation_id.as_str())?;
            if let Err(e) = self.store.update(&path, fields.clone()).await {
                warn!(conversation = %message.conversation_id, owner = %owner, error = %e, "failed to update last message");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        self.cache_update(&message.conversation_id, |c| c.last_message = Some(last.clone()));
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Writes the summary of `message` into `owner_id`'s entry only.
    pub async fn refresh_summary(&self, owner_id: &str, message: &Message) -> Result<()> {
        let newer_known = self
            .cached(&message.conversation_id)
            .and_then(|c| c.last_message)
            .and_then(|last| last.sequence)
            .is_some_and(|seq| seq >= message.sequence);
        if newer_known {
            return Ok(());
        }
        let last = self.summarize(message);
        let path = StorePath::conversation_entry(owner_id, message.conversation_id.as_str())?;
        self.store.update(&path, schema::summary_fields(&last)).await?;
        self.cache_update(&message.conversation_id, |c| c.last_message = Some(last));
        Ok(())
    }

    /// All conversations of `user_id`, unread first, then newest first.
    ///
    /// Malformed entries are logged and skipped.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let path = StorePath::user_conversations(user_id)?;
        let value = self.store.read_once(&path).await?;
        Ok(decode_list(user_id, &path, value.as_ref()))
    }

    pub async fn set_unread(&self, owner_id: &str, id: &ConversationId, count: u32) -> Result<()> {
        let path = StorePath::conversation_entry(owner_id, id.as_str())?;
        self.store.update(&path, schema::unread_fields(count)).await?;
        debug!(conversation = %id, count, "persisted unread count");
        self.cache_update(id, |c| c.unread_count = count);
        Ok(())
    }

    /// Records in the counterparty's entry that its messages up to
    /// `sequence` have been read.
    pub async fn record_read_receipt(&self, counterparty_id: &str, id: &ConversationId, sequence: u64) -> Result<()> {
        let path = StorePath::conversation_entry(counterparty_id, id.as_str())?;
        self.store.update(&path, schema::read_receipt_fields(sequence)).await
    }

    pub fn cached(&self, id: &ConversationId) -> Option<Conversation> {
        self.lock_cache().get(id).cloned()
    }

    /// Cached conversations in list order.
    pub fn cached_list(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self.lock_cache().values().cloned().collect();
        sort_for_list(&mut list);
        list
    }

    pub fn replace_cache(&self, conversations: Vec<Conversation>) {
        let mut cache = self.lock_cache();
        cache.clear();
        cache.extend(conversations.into_iter().map(|c| (c.id.clone(), c)));
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    fn summarize(&self, message: &Message) -> LastMessage {
        LastMessage {
            preview: message.body.preview(self.summary_max_chars),
            sender_id: message.sender_id.clone(),
            sender_role: message.sender_role,
            sent_at: message.created_at,
            sequence: Some(message.sequence),
        }
    }

    fn cache_put(&self, conversation: Conversation) {
        self.lock_cache().insert(conversation.id.clone(), conversation);
    }

    fn cache_update(&self, id: &ConversationId, apply: impl FnOnce(&mut Conversation)) {
        if let Some(conversation) = self.lock_cache().get_mut(id) {
            apply(conversation);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, Conversation>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Decodes a `users/{uid}/conversations` snapshot into list order.
pub fn decode_list(owner_id: &str, path: &StorePath, value: Option<&Value>) -> Vec<Conversation> {
    let decoded = schema::decode_conversations(owner_id, path, value);
    for error in &decoded.quarantined {
        warn!(owner = owner_id, error = %error, "skipping malformed conversation entry");
    }
    let mut conversations = decoded.items;
    sort_for_list(&mut conversations);
    conversations
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
