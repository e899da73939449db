// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! presence_poll_interval_ms = 3000
//! heartbeat_interval_ms = 30000
//! presence_ttl_ms = 90000
//! summary_max_chars = 80
//! request_timeout_ms = 10000
//!
//! [remote]
//! url = "ws://localhost:7890"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use lc_core::{Error, Result};

/// Tunables for [`crate::ConversationSyncEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How often presence watchers re-read a counterparty's status.
    #[serde(default = "default_presence_poll_interval_ms")]
    pub presence_poll_interval_ms: u64,
    /// How often the signed-in user's `lastSeen` is refreshed while online.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Age after which an `online` record is read as offline. Must exceed the heartbeat interval.
    #[serde(default = "default_presence_ttl_ms")]
    pub presence_ttl_ms: u64,
    /// Length of last-message previews in conversation lists.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    /// Max time to wait for a relay reply.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Relay to connect to. Absent means an in-process store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

/// Relay connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// `ws://...` or `wss://...`
    pub url: String,
}

fn default_presence_poll_interval_ms() -> u64 {
    3_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_presence_ttl_ms() -> u64 {
    90_000
}

fn default_summary_max_chars() -> usize {
    80
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            presence_poll_interval_ms: default_presence_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            presence_ttl_ms: default_presence_ttl_ms(),
            summary_max_chars: default_summary_max_chars(),
            request_timeout_ms: default_request_timeout_ms(),
            remote: None,
        }
    }
}

impl EngineConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants between fields.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("presence_poll_interval_ms", self.presence_poll_interval_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("presence_ttl_ms", self.presence_ttl_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.presence_ttl_ms <= self.heartbeat_interval_ms {
            return Err(Error::Config(format!(
                "presence_ttl_ms ({}) must exceed heartbeat_interval_ms ({})\n  hint: a TTL shorter than the heartbeat makes online users flicker offline",
                self.presence_ttl_ms, self.heartbeat_interval_ms
            )));
        }
        if self.summary_max_chars == 0 {
            return Err(Error::Config("summary_max_chars must be greater than zero".to_string()));
        }
        if let Some(ref remote) = self.remote {
            if !(remote.url.starts_with("ws://") || remote.url.starts_with("wss://")) {
                return Err(Error::Config(format!(
                    "invalid remote URL '{}': must be ws:// or wss://",
                    remote.url
                )));
            }
        }
        Ok(())
    }

    pub fn presence_poll_interval(&self) -> Duration {
        Duration::from_millis(self.presence_poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn presence_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.presence_ttl_ms).unwrap_or(i64::MAX))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
