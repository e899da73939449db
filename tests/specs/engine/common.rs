// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test files,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use lc_core::{
    Contact, ConversationId, CurrentUser, DeliveryState, Draft, ManualClock, Message, PresenceStatus, SenderRole,
    StorePath,
};
pub use lc_engine::{ConversationSyncEngine, EngineConfig, Error, MemoryStore, ReaderState, Scope};
pub use serde_json::json;

pub const RENTER: &str = "renter-1";
pub const OWNER: &str = "owner-1";

pub fn renter() -> CurrentUser {
    CurrentUser::new(Contact::new(RENTER, "Rita"), SenderRole::Renter).unwrap()
}

pub fn owner() -> CurrentUser {
    CurrentUser::new(Contact::new(OWNER, "Omar"), SenderRole::Owner).unwrap()
}

/// One shared store and clock, with an engine per signed-in participant.
pub struct World {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
}

impl World {
    pub fn new() -> Self {
        World { store: MemoryStore::new(), clock: Arc::new(ManualClock::new(1_700_000_000_000)) }
    }

    pub fn engine(&self) -> ConversationSyncEngine {
        self.engine_with(EngineConfig::default())
    }

    pub fn engine_with(&self, config: EngineConfig) -> ConversationSyncEngine {
        ConversationSyncEngine::with_clock(Arc::new(self.store.clone()), config, self.clock.clone()).unwrap()
    }

    pub async fn sign_in(&self, user: CurrentUser) -> ConversationSyncEngine {
        self.sign_in_with(user, EngineConfig::default()).await
    }

    pub async fn sign_in_with(&self, user: CurrentUser, config: EngineConfig) -> ConversationSyncEngine {
        let engine = self.engine_with(config);
        engine.initialize(user).await.unwrap();
        engine
    }

    /// Renter and owner both signed in, with a conversation opened by the renter.
    pub async fn pair(&self) -> (ConversationSyncEngine, ConversationSyncEngine, ConversationId) {
        let owner_engine = self.sign_in(owner()).await;
        let renter_engine = self.sign_in(renter()).await;
        let id = renter_engine.open_conversation(&owner().contact, Some("listing-1")).await.unwrap();
        eventually(|| owner_engine.list_conversations().iter().any(|c| c.id == id)).await;
        (renter_engine, owner_engine, id)
    }

    pub fn entry(&self, uid: &str, id: &ConversationId) -> serde_json::Value {
        self.store
            .get(&StorePath::conversation_entry(uid, id.as_str()).unwrap())
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn stored_message(&self, id: &ConversationId, message: &Message) -> serde_json::Value {
        self.store
            .get(&StorePath::message(id.as_str(), message.id.as_str()).unwrap())
            .unwrap_or(serde_json::Value::Null)
    }
}

pub fn text(body: &str) -> Draft {
    Draft::text(body).unwrap()
}

/// Polls `check` until it holds, yielding to background tasks in between.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held");
}

pub fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Arc<dyn Fn(T) + Send + Sync>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    (seen, Arc::new(move |value| s.lock().unwrap().push(value)))
}

pub fn sequences(messages: &[Message]) -> Vec<u64> {
    messages.iter().map(|m| m.sequence).collect()
}
