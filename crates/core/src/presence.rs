// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Presence status.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A user's availability as observed by counterparties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "online" => Ok(PresenceStatus::Online),
            "offline" => Ok(PresenceStatus::Offline),
            _ => Err(Error::InvalidInput(format!("invalid presence status: '{s}'"))),
        }
    }
}

/// The presence record a user writes about themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub user_id: String,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

impl Presence {
    /// Status as it should be shown at `now`.
    ///
    /// An `online` record that has not been refreshed within `ttl` is
    /// reported as offline: its writer most likely lost connectivity.
    pub fn effective_status(&self, now: DateTime<Utc>, ttl: Duration) -> PresenceStatus {
        match self.status {
            PresenceStatus::Online if now - self.last_seen > ttl => PresenceStatus::Offline,
            status => status,
        }
    }
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
