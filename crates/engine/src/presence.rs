// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Online/offline presence.
//!
//! A user writes only their own `users/{uid}/online` record. While online the
//! record's `lastSeen` is refreshed on a heartbeat; readers treat an online
//! record older than the TTL as offline, which covers clients that vanish
//! without signing out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use lc_core::schema::{self, PresenceRecord};
use lc_core::{ClockSource, Error, PresenceStatus, Result, StorePath};

use crate::scope::Scope;
use crate::store::RemoteSyncClient;

/// Receives presence transitions from [`PresenceTracker::watch`].
pub type PresenceCallback = Arc<dyn Fn(PresenceStatus) + Send + Sync>;

#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn RemoteSyncClient>,
    clock: Arc<dyn ClockSource>,
    ttl: chrono::Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn RemoteSyncClient>, clock: Arc<dyn ClockSource>, ttl: chrono::Duration) -> Self {
        PresenceTracker { store, clock, ttl }
    }

    pub async fn set_online(&self, user_id: &str) -> Result<()> {
        self.write_status(user_id, PresenceStatus::Online).await?;
        debug!(user = user_id, "presence online");
        Ok(())
    }

    /// Marks `user_id` offline. A permission failure (the session is already
    /// gone) is ignored.
    pub async fn set_offline(&self, user_id: &str) -> Result<()> {
        match self.write_status(user_id, PresenceStatus::Offline).await {
            Err(Error::PermissionDenied(reason)) => {
                debug!(user = user_id, %reason, "presence write denied, ignoring");
                Ok(())
            }
            Err(e) => Err(e),
            Ok(()) => {
                debug!(user = user_id, "presence offline");
                Ok(())
            }
        }
    }

    /// Refreshes `lastSeen` without touching the status.
    pub async fn heartbeat(&self, user_id: &str) -> Result<()> {
        let path = StorePath::presence(user_id)?;
        let mut fields = Map::new();
        fields.insert("lastSeen".into(), Value::from(self.now_ms()));
        self.store.update(&path, fields).await
    }

    /// Current status of `user_id`. Never-seen and malformed records read as offline.
    pub async fn get_status(&self, user_id: &str) -> Result<PresenceStatus> {
        let path = StorePath::presence(user_id)?;
        let value = self.store.read_once(&path).await?;
        match schema::decode_presence(user_id, &path, value.as_ref()) {
            Ok(Some(presence)) => Ok(presence.effective_status(self.clock.now(), self.ttl)),
            Ok(None) => Ok(PresenceStatus::Offline),
            Err(e) => {
                warn!(user = user_id, error = %e, "malformed presence record");
                Ok(PresenceStatus::Offline)
            }
        }
    }

    /// Rewrites `lastSeen` every `period` until `scope` is disposed.
    pub fn start_heartbeat(&self, scope: &Scope, user_id: &str, period: Duration) {
        let tracker = self.clone();
        let user_id = user_id.to_string();
        scope.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = tracker.heartbeat(&user_id).await {
                    warn!(user = %user_id, error = %e, "presence heartbeat failed");
                }
            }
        });
    }

    /// Polls `user_id` every `period` and reports the first status, then
    /// transitions only. Poll failures are logged and skipped.
    pub fn watch(&self, scope: &Scope, user_id: &str, period: Duration, on_change: PresenceCallback) {
        let tracker = self.clone();
        let user_id = user_id.to_string();
        let token = scope.token();
        scope.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = None;
            loop {
                ticker.tick().await;
                let status = match tracker.get_status(&user_id).await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(user = %user_id, error = %e, "presence poll failed");
                        continue;
                    }
                };
                if last != Some(status) && !token.is_cancelled() {
                    last = Some(status);
                    on_change(status);
                }
            }
        });
    }

    async fn write_status(&self, user_id: &str, status: PresenceStatus) -> Result<()> {
        let path = StorePath::presence(user_id)?;
        let record = PresenceRecord { status, last_seen: self.now_ms() };
        self.store.update(&path, schema::to_fields(&record)?).await
    }

    fn now_ms(&self) -> i64 {
        i64::try_from(self.clock.now_ms()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
