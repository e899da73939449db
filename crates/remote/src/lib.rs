// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! lc-remote: WebSocket relay hosting the leasechat store.
//!
//! The relay holds the canonical hierarchical tree, answers reads and
//! mutations, and pushes changes to subscribed clients. With a data
//! directory it snapshots the tree to disk after every mutation.

pub mod server;
pub mod state;

pub use state::ServerState;
