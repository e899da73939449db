// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The conversation sync engine.
//!
//! [`ConversationSyncEngine`] composes the directory, the message logs, the
//! unread reconciler, and presence over one [`RemoteSyncClient`]. It is a
//! read-through/write-through cache with an optimistic overlay; the store
//! stays the only source of truth.
//!
//! Store subscriptions never do work inline. Each one feeds a latest-value
//! slot that a background task drains under the engine's reconcile lock.
//! Focus, blur, and mark-as-read take the same lock and drain the slot first,
//! so a snapshot that arrived just before a transition is applied in the
//! state it arrived in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use lc_core::schema::{self, MessageRecord, LAST_SEQUENCE_FIELD};
use lc_core::{
    sort_for_list, ClockSource, Contact, Conversation, ConversationId, CurrentUser, DeliveryState, Draft, Error,
    Message, MessageId, PresenceStatus, Result, StorePath, SystemClock,
};

use crate::config::EngineConfig;
use crate::directory::{self, ConversationDirectory};
use crate::listeners::Listeners;
use crate::messages::{MessageStore, Reservation, SendOutcome};
use crate::presence::{PresenceCallback, PresenceTracker};
use crate::scope::Scope;
use crate::store::{self, BoxFuture, RemoteSyncClient};
use crate::unread::{ReaderState, UnreadEffect, UnreadReconciler};

/// Receives the merged message list of one conversation.
pub type MessagesCallback = Arc<dyn Fn(Vec<Message>) + Send + Sync>;

/// Receives the signed-in user's conversation list.
pub type ConversationsCallback = Arc<dyn Fn(Vec<Conversation>) + Send + Sync>;

/// Handle to the engine. Clones share state.
#[derive(Clone)]
pub struct ConversationSyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<dyn RemoteSyncClient>,
    config: EngineConfig,
    clock: Arc<dyn ClockSource>,
    directory: ConversationDirectory,
    presence: PresenceTracker,
    messages: Mutex<MessageStore>,
    unread: Mutex<UnreadReconciler>,
    /// Orders snapshot application against local transitions.
    reconcile: tokio::sync::Mutex<()>,
    message_listeners: Arc<Listeners<ConversationId, Vec<Message>>>,
    list_listeners: Arc<Listeners<(), Vec<Conversation>>>,
    feeds: Mutex<HashMap<Feed, Arc<Pump>>>,
    session: Mutex<Option<Session>>,
}

struct Session {
    user: CurrentUser,
    /// Owns the store subscriptions and pump tasks.
    background: Scope,
    heartbeat: Option<Scope>,
}

/// A store path the engine keeps a subscription on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Feed {
    Directory,
    Messages(ConversationId),
}

impl Feed {
    fn path(&self, user_id: &str) -> Result<StorePath> {
        match self {
            Feed::Directory => StorePath::user_conversations(user_id),
            Feed::Messages(id) => StorePath::messages(id.as_str()),
        }
    }
}

/// Latest undelivered snapshot of a feed.
#[derive(Default)]
struct Pump {
    latest: Mutex<Option<Option<Value>>>,
    notify: Notify,
}

impl Pump {
    fn offer(&self, value: Option<Value>) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
        self.notify.notify_one();
    }

    fn take(&self) -> Option<Option<Value>> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl ConversationSyncEngine {
    pub fn new(store: Arc<dyn RemoteSyncClient>, config: EngineConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn RemoteSyncClient>,
        config: EngineConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self> {
        config.validate()?;
        let directory = ConversationDirectory::new(Arc::clone(&store), config.summary_max_chars);
        let presence = PresenceTracker::new(Arc::clone(&store), Arc::clone(&clock), config.presence_ttl());
        Ok(ConversationSyncEngine {
            inner: Arc::new(EngineInner {
                store,
                config,
                clock,
                directory,
                presence,
                messages: Mutex::new(MessageStore::new()),
                unread: Mutex::new(UnreadReconciler::default()),
                reconcile: tokio::sync::Mutex::new(()),
                message_listeners: Arc::new(Listeners::new()),
                list_listeners: Arc::new(Listeners::new()),
                feeds: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
            }),
        })
    }

    /// Builds an engine over the store `config` points at: the relay named by
    /// `[remote] url`, or an in-process store when there is none.
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = store::open(&config).await?;
        Self::new(store, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.inner.current_user()
    }

    /// Starts a session for `user`: loads the conversation directory and
    /// subscribes to it and to every listed conversation.
    ///
    /// Replaces any previous session. Fails with [`Error::NotAuthenticated`]
    /// for a user without an id.
    pub async fn initialize(&self, user: CurrentUser) -> Result<()> {
        if user.id().trim().is_empty() {
            return Err(Error::NotAuthenticated);
        }
        self.inner.end_session();

        let conversations = self.inner.directory.list_for_user(user.id()).await?;
        {
            let _guard = self.inner.reconcile.lock().await;
            let mut unread = self.inner.lock_unread();
            unread.reset(user.id());
            for conversation in &conversations {
                unread.seed(&conversation.id, conversation.unread_count);
            }
            drop(unread);
            self.inner.directory.replace_cache(conversations.clone());
            *self.inner.lock_session() = Some(Session {
                user: user.clone(),
                background: Scope::new(),
                heartbeat: None,
            });
        }

        let mut feeds = vec![Feed::Directory];
        feeds.extend(conversations.iter().map(|c| Feed::Messages(c.id.clone())));
        for feed in feeds {
            if let Err(e) = self.inner.ensure_feed(feed).await {
                self.inner.end_session();
                return Err(e);
            }
        }
        info!(user = user.id(), conversations = conversations.len(), "session started");
        Ok(())
    }

    /// Ends the session: stops the heartbeat, marks the user offline (best
    /// effort), and releases every subscription.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(user) = self.current_user() else { return Ok(()) };
        self.inner.stop_heartbeat();
        if let Err(e) = self.inner.presence.set_offline(user.id()).await {
            warn!(user = user.id(), error = %e, "failed to mark offline on sign-out");
        }
        self.inner.end_session();
        info!(user = user.id(), "signed out");
        Ok(())
    }

    /// Finds or creates the conversation with `contact` and starts syncing it.
    pub async fn open_conversation(&self, contact: &Contact, listing_id: Option<&str>) -> Result<ConversationId> {
        let user = self.inner.require_user()?;
        let conversation = self.inner.directory.get_or_create(&user, contact, listing_id).await?;
        self.inner.lock_unread().seed(&conversation.id, conversation.unread_count);
        self.inner.ensure_feed(Feed::Messages(conversation.id.clone())).await?;

        let _guard = self.inner.reconcile.lock().await;
        self.inner.publish_list();
        Ok(conversation.id)
    }

    /// Sends `draft` to the counterparty of `conversation_id`.
    ///
    /// The message appears immediately as `sending`. Delivery problems do not
    /// fail the call; the returned message is then `failed` and stays visible
    /// until resent.
    pub async fn send_message(&self, conversation_id: &ConversationId, draft: Draft) -> Result<Message> {
        let user = self.inner.require_user()?;
        let conversation = self
            .inner
            .directory
            .cached(conversation_id)
            .ok_or_else(|| Error::ConversationNotFound(conversation_id.to_string()))?;

        let local = self.inner.lock_messages().append_optimistic(
            conversation_id,
            draft,
            &user,
            &conversation.contact.id,
            self.inner.clock.now(),
        );
        debug!(conversation = %conversation_id, local = %local.id, "sending message");
        self.inner.publish_messages_ordered(conversation_id).await;

        let (reserved, attempt) = self.inner.deliver(&local, None).await;
        self.inner.finish_send(&local, reserved, attempt).await
    }

    /// Retries a `failed` message, reusing any sequence number its first
    /// attempt reserved.
    pub async fn resend_message(&self, conversation_id: &ConversationId, local_id: &MessageId) -> Result<Message> {
        self.inner.require_user()?;
        let ticket = self.inner.lock_messages().resend(conversation_id, local_id)?;
        debug!(conversation = %conversation_id, local = %local_id, "resending message");
        self.inner.publish_messages_ordered(conversation_id).await;

        let (reserved, attempt) = self.inner.deliver(&ticket.message, ticket.reservation).await;
        self.inner.finish_send(&ticket.message, reserved, attempt).await
    }

    /// Delivers the merged message list of `conversation_id` now and after
    /// every change, until `scope` is disposed.
    ///
    /// Awaits the initial load; failing to establish the subscription is an
    /// error.
    pub async fn subscribe_messages(
        &self,
        scope: &Scope,
        conversation_id: &ConversationId,
        on_change: MessagesCallback,
    ) -> Result<()> {
        self.inner.require_user()?;
        self.inner.ensure_feed(Feed::Messages(conversation_id.clone())).await?;

        let _guard = self.inner.reconcile.lock().await;
        self.inner.drain_messages_locked(conversation_id).await;
        let registration = self.inner.message_listeners.register(
            conversation_id.clone(),
            scope.token(),
            Arc::clone(&on_change),
        );
        scope.adopt(registration);
        if !scope.is_disposed() {
            let current = self.inner.lock_messages().merged(conversation_id);
            on_change(current);
        }
        Ok(())
    }

    /// Delivers `user_id`'s conversation list now and after every change,
    /// until `scope` is disposed. Only the signed-in user's list is readable.
    pub async fn subscribe_conversation_list(
        &self,
        scope: &Scope,
        user_id: &str,
        on_change: ConversationsCallback,
    ) -> Result<()> {
        let user = self.inner.require_user()?;
        if user.id() != user_id {
            return Err(Error::PermissionDenied(format!("conversation list of {user_id}")));
        }

        let _guard = self.inner.reconcile.lock().await;
        let registration = self.inner.list_listeners.register((), scope.token(), Arc::clone(&on_change));
        scope.adopt(registration);
        if !scope.is_disposed() {
            on_change(self.inner.conversation_list());
        }
        Ok(())
    }

    /// The user opened or refocused the conversation.
    pub async fn focus_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        self.transition(conversation_id, |unread, id, confirmed| unread.enter_viewing(id, confirmed))
            .await
    }

    /// The user navigated away from the conversation.
    pub async fn blur_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        self.transition(conversation_id, |unread, id, _| unread.leave_viewing(id)).await
    }

    /// Marks every counterparty message read and resets the unread count.
    pub async fn mark_as_read(&self, conversation_id: &ConversationId) -> Result<()> {
        self.transition(conversation_id, |unread, id, confirmed| unread.mark_as_read(id, confirmed))
            .await
    }

    async fn transition<F>(&self, conversation_id: &ConversationId, apply: F) -> Result<()>
    where
        F: FnOnce(&mut UnreadReconciler, &ConversationId, &[Message]) -> Vec<UnreadEffect>,
    {
        let user = self.inner.require_user()?;
        let _guard = self.inner.reconcile.lock().await;
        self.inner.drain_messages_locked(conversation_id).await;
        let confirmed = self.inner.lock_messages().confirmed(conversation_id);
        let effects = {
            let mut unread = self.inner.lock_unread();
            apply(&mut *unread, conversation_id, confirmed.as_slice())
        };
        self.inner.settle(&user, conversation_id, effects).await;
        Ok(())
    }

    /// Pulls the message log of `conversation_id` once and applies it.
    pub async fn refresh_conversation(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.inner.require_user()?;
        let path = StorePath::messages(conversation_id.as_str())?;
        let value = self.inner.store.read_once(&path).await?;

        let _guard = self.inner.reconcile.lock().await;
        self.inner.apply_snapshot(conversation_id, value).await;
        self.inner.drain_messages_locked(conversation_id).await;
        Ok(self.inner.lock_messages().merged(conversation_id))
    }

    /// Marks the signed-in user online and starts the heartbeat.
    ///
    /// Presence write failures are logged, not returned.
    pub async fn set_online(&self) -> Result<()> {
        let user = self.inner.require_user()?;
        if let Err(e) = self.inner.presence.set_online(user.id()).await {
            warn!(user = user.id(), error = %e, "failed to set online");
        }
        let heartbeat = Scope::new();
        self.inner
            .presence
            .start_heartbeat(&heartbeat, user.id(), self.inner.config.heartbeat_interval());
        // Signed out while the presence write was in flight; the heartbeat
        // is stopped when it drops here.
        let previous = match self.inner.lock_session().as_mut() {
            Some(session) => session.heartbeat.replace(heartbeat),
            None => return Err(Error::NotAuthenticated),
        };
        drop(previous);
        Ok(())
    }

    /// Stops the heartbeat and marks the signed-in user offline.
    ///
    /// Presence write failures are logged, not returned.
    pub async fn set_offline(&self) -> Result<()> {
        let user = self.inner.require_user()?;
        self.inner.stop_heartbeat();
        if let Err(e) = self.inner.presence.set_offline(user.id()).await {
            warn!(user = user.id(), error = %e, "failed to set offline");
        }
        Ok(())
    }

    pub async fn presence_status(&self, user_id: &str) -> Result<PresenceStatus> {
        self.inner.require_user()?;
        self.inner.presence.get_status(user_id).await
    }

    /// Polls `user_id`'s presence on the configured interval and reports
    /// transitions until `scope` is disposed.
    pub fn watch_presence(&self, scope: &Scope, user_id: &str, on_change: PresenceCallback) -> Result<()> {
        self.inner.require_user()?;
        self.inner
            .presence
            .watch(scope, user_id, self.inner.config.presence_poll_interval(), on_change);
        Ok(())
    }

    pub fn unread_count(&self, conversation_id: &ConversationId) -> u32 {
        self.inner.lock_unread().unread_count(conversation_id)
    }

    pub fn reader_state(&self, conversation_id: &ConversationId) -> ReaderState {
        self.inner.lock_unread().state(conversation_id)
    }

    /// Confirmed and pending messages of `conversation_id` in display order.
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.inner.lock_messages().merged(conversation_id)
    }

    /// The signed-in user's conversations in list order.
    pub fn list_conversations(&self) -> Vec<Conversation> {
        self.inner.conversation_list()
    }
}

impl EngineInner {
    fn lock_messages(&self) -> MutexGuard<'_, MessageStore> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_unread(&self) -> MutexGuard<'_, UnreadReconciler> {
        self.unread.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_feeds(&self) -> MutexGuard<'_, HashMap<Feed, Arc<Pump>>> {
        self.feeds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_user(&self) -> Option<CurrentUser> {
        self.lock_session().as_ref().map(|s| s.user.clone())
    }

    fn require_user(&self) -> Result<CurrentUser> {
        self.current_user().ok_or(Error::NotAuthenticated)
    }

    fn stop_heartbeat(&self) {
        let heartbeat = self.lock_session().as_mut().and_then(|s| s.heartbeat.take());
        drop(heartbeat);
    }

    /// Drops the session and everything it owns.
    fn end_session(&self) {
        let session = self.lock_session().take();
        let Some(session) = session else { return };
        drop(session);
        self.lock_feeds().clear();
        self.lock_messages().clear();
        self.lock_unread().reset("");
        self.directory.clear_cache();
        self.message_listeners.clear();
        self.list_listeners.clear();
    }

    /// Subscribes to `feed` unless already subscribed.
    ///
    /// Boxed because pump tasks call back into it for conversations that
    /// show up in the directory.
    fn ensure_feed(self: &Arc<Self>, feed: Feed) -> BoxFuture<'static, Result<()>> {
        let inner = Arc::clone(self);
        Box::pin(async move {
            if inner.lock_feeds().contains_key(&feed) {
                return Ok(());
            }
            let user = inner.require_user()?;
            let path = feed.path(user.id())?;
            let pump = Arc::new(Pump::default());
            let sink = Arc::clone(&pump);
            let subscription = inner.store.subscribe(&path, Arc::new(move |value| sink.offer(value))).await?;

            let session = inner.lock_session();
            let Some(session) = session.as_ref() else {
                return Err(Error::NotAuthenticated);
            };
            let mut feeds = inner.lock_feeds();
            if feeds.contains_key(&feed) {
                return Ok(());
            }
            feeds.insert(feed.clone(), Arc::clone(&pump));
            debug!(%path, "feed subscribed");
            session.background.adopt(subscription);
            session.background.spawn(run_pump(Arc::downgrade(&inner), feed, pump));
            Ok(())
        })
    }

    fn take(&self, feed: &Feed) -> Option<Option<Value>> {
        let pump = self.lock_feeds().get(feed).cloned()?;
        pump.take()
    }

    async fn drain_directory_locked(self: &Arc<Self>) {
        let Some(value) = self.take(&Feed::Directory) else { return };
        let Some(user) = self.current_user() else { return };
        let path = match StorePath::user_conversations(user.id()) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "bad directory path");
                return;
            }
        };
        let conversations = directory::decode_list(user.id(), &path, value.as_ref());
        {
            let mut unread = self.lock_unread();
            for conversation in &conversations {
                unread.seed(&conversation.id, conversation.unread_count);
            }
        }
        let new_ids: Vec<ConversationId> = {
            let feeds = self.lock_feeds();
            conversations
                .iter()
                .filter(|c| !feeds.contains_key(&Feed::Messages(c.id.clone())))
                .map(|c| c.id.clone())
                .collect()
        };
        self.directory.replace_cache(conversations);
        for id in new_ids {
            if let Err(e) = self.ensure_feed(Feed::Messages(id.clone())).await {
                warn!(conversation = %id, error = %e, "failed to subscribe to conversation");
            }
        }
        self.publish_list();
    }

    async fn drain_messages_locked(&self, conversation_id: &ConversationId) {
        let Some(value) = self.take(&Feed::Messages(conversation_id.clone())) else { return };
        self.apply_snapshot(conversation_id, value).await;
    }

    /// Merges a message-log snapshot and performs the unread writes it implies.
    async fn apply_snapshot(&self, conversation_id: &ConversationId, value: Option<Value>) {
        let Some(user) = self.current_user() else { return };
        let path = match StorePath::messages(conversation_id.as_str()) {
            Ok(path) => path,
            Err(e) => {
                warn!(conversation = %conversation_id, error = %e, "bad message path");
                return;
            }
        };
        let decoded = schema::decode_messages(conversation_id, &path, value.as_ref());
        for error in &decoded.quarantined {
            warn!(conversation = %conversation_id, error = %error, "skipping malformed message");
        }
        self.lock_messages().reconcile_snapshot(conversation_id, decoded.items.clone());
        let effects = self.lock_unread().observe(conversation_id, &decoded.items);
        self.settle(&user, conversation_id, effects).await;
    }

    /// Applies `effects` locally, notifies listeners, then performs the writes.
    async fn settle(&self, user: &CurrentUser, conversation_id: &ConversationId, effects: Vec<UnreadEffect>) {
        for effect in &effects {
            if let UnreadEffect::MarkRead(ids) = effect {
                self.lock_messages().mark_read_local(conversation_id, ids);
            }
        }
        self.publish_messages(conversation_id);
        if effects.is_empty() {
            return;
        }
        for effect in effects {
            self.write_effect(user, conversation_id, effect).await;
        }
        self.publish_list();
    }

    async fn write_effect(&self, user: &CurrentUser, conversation_id: &ConversationId, effect: UnreadEffect) {
        match effect {
            UnreadEffect::PersistCount(count) => {
                if let Err(e) = self.directory.set_unread(user.id(), conversation_id, count).await {
                    warn!(conversation = %conversation_id, count, error = %e, "failed to persist unread count");
                    self.lock_unread().invalidate(conversation_id);
                }
            }
            UnreadEffect::MarkRead(ids) => {
                for id in ids {
                    let result = match StorePath::message(conversation_id.as_str(), id.as_str()) {
                        Ok(path) => self.store.update(&path, schema::message_read_fields()).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        warn!(conversation = %conversation_id, message = %id, error = %e, "failed to mark message read");
                    }
                }
            }
            UnreadEffect::ReadReceipt(sequence) => {
                let Some(counterparty) = self.counterparty_of(user, conversation_id) else {
                    debug!(conversation = %conversation_id, "no counterparty known for read receipt");
                    return;
                };
                if let Err(e) = self.directory.record_read_receipt(&counterparty, conversation_id, sequence).await {
                    warn!(conversation = %conversation_id, sequence, error = %e, "failed to write read receipt");
                }
            }
            UnreadEffect::RefreshSummary(message) => {
                if let Err(e) = self.directory.refresh_summary(user.id(), &message).await {
                    warn!(conversation = %conversation_id, error = %e, "failed to refresh summary");
                }
            }
        }
    }

    fn counterparty_of(&self, user: &CurrentUser, conversation_id: &ConversationId) -> Option<String> {
        if let Some(conversation) = self.directory.cached(conversation_id) {
            return Some(conversation.contact.id);
        }
        self.lock_messages()
            .confirmed(conversation_id)
            .into_iter()
            .find(|m| m.sender_id != user.id())
            .map(|m| m.sender_id)
    }

    /// Allocates a sequence number (unless one is reserved) and writes the message.
    ///
    /// Returns the id the message was written under, once one was reserved,
    /// alongside the outcome.
    async fn deliver(&self, local: &Message, reservation: Option<Reservation>) -> (Option<MessageId>, Result<Message>) {
        let reservation = match reservation {
            Some(reservation) => reservation,
            None => match self.allocate(local).await {
                Ok(reservation) => reservation,
                Err(e) => return (None, Err(e)),
            },
        };
        let reserved = reservation.id.clone();
        (Some(reserved), self.write_message(local, reservation).await)
    }

    async fn allocate(&self, local: &Message) -> Result<Reservation> {
        let conversation_id = &local.conversation_id;
        let meta = StorePath::conversation_meta(conversation_id.as_str())?;
        let counter = self.store.increment(&meta, LAST_SEQUENCE_FIELD, 1).await?;
        let sequence = u64::try_from(counter)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| Error::malformed(&meta, format!("sequence counter at {counter}")))?;
        let reservation = Reservation {
            id: MessageId::permanent(conversation_id, sequence, &local.sender_id, &local.created_at),
            sequence,
        };
        self.lock_messages().reserve(conversation_id, &local.id, reservation.clone())?;
        Ok(reservation)
    }

    async fn write_message(&self, local: &Message, reservation: Reservation) -> Result<Message> {
        let message = Message {
            id: reservation.id,
            sequence: reservation.sequence,
            delivery: DeliveryState::Sent,
            ..local.clone()
        };
        let path = StorePath::message(local.conversation_id.as_str(), message.id.as_str())?;
        let fields = schema::to_fields(&MessageRecord::from_message(&message))?;
        self.store.update(&path, fields).await?;
        Ok(message)
    }

    async fn finish_send(
        &self,
        local: &Message,
        reserved: Option<MessageId>,
        attempt: Result<Message>,
    ) -> Result<Message> {
        let conversation_id = &local.conversation_id;
        let outcome = match attempt {
            Ok(message) => SendOutcome::Sent(message),
            Err(e) => {
                warn!(
                    conversation = %conversation_id,
                    local = %local.id,
                    transient = e.is_transient(),
                    error = %e,
                    "send failed"
                );
                SendOutcome::Failed
            }
        };

        // Summary writes share the lock with unread effects so an older
        // incoming summary never lands after this one.
        let _guard = self.reconcile.lock().await;
        let confirmed = self.lock_messages().confirm(conversation_id, &local.id, outcome);
        let message = match confirmed {
            Ok(message) => message,
            // Only a snapshot carrying the reserved id retires a pending
            // entry, so the write landed after all.
            Err(Error::MessageNotFound(_)) => {
                let landed = reserved.and_then(|id| {
                    self.lock_messages()
                        .confirmed(conversation_id)
                        .into_iter()
                        .find(|m| m.id == id)
                });
                match landed {
                    Some(message) => message,
                    None => {
                        warn!(conversation = %conversation_id, local = %local.id, "pending send vanished before it was confirmed");
                        Message { delivery: DeliveryState::Failed, ..local.clone() }
                    }
                }
            }
            Err(e) => return Err(e),
        };
        self.publish_messages(conversation_id);

        if message.delivery == DeliveryState::Sent {
            if let Err(e) = self.directory.update_last_message(&message).await {
                warn!(conversation = %conversation_id, error = %e, "failed to update conversation summary");
            }
            self.publish_list();
        }
        Ok(message)
    }

    fn publish_messages(&self, conversation_id: &ConversationId) {
        let merged = self.lock_messages().merged(conversation_id);
        self.message_listeners.notify(conversation_id, merged);
    }

    async fn publish_messages_ordered(&self, conversation_id: &ConversationId) {
        let _guard = self.reconcile.lock().await;
        self.publish_messages(conversation_id);
    }

    fn publish_list(&self) {
        self.list_listeners.notify(&(), self.conversation_list());
    }

    /// Cached directory entries with the reconciler's unread counts.
    fn conversation_list(&self) -> Vec<Conversation> {
        let mut list = self.directory.cached_list();
        {
            let unread = self.lock_unread();
            for conversation in &mut list {
                conversation.unread_count = unread.unread_count(&conversation.id);
            }
        }
        sort_for_list(&mut list);
        list
    }
}

/// Applies a feed's snapshots as they arrive, until the engine goes away or
/// the owning scope is disposed.
async fn run_pump(engine: Weak<EngineInner>, feed: Feed, pump: Arc<Pump>) {
    loop {
        pump.notify.notified().await;
        let Some(inner) = engine.upgrade() else { break };
        let _guard = inner.reconcile.lock().await;
        match &feed {
            Feed::Directory => inner.drain_directory_locked().await,
            Feed::Messages(id) => inner.drain_messages_locked(id).await,
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
