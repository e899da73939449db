// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! lc-remote: WebSocket relay server for leasechat.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lc_remote::{server, ServerState};

/// lc-remote: leasechat relay server
#[derive(Parser, Debug)]
#[command(name = "lc-remote")]
#[command(about = "WebSocket relay hosting the leasechat conversation store")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// Directory for the store snapshot (in-memory only if omitted)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the flag.
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting lc-remote server");
    info!("  Bind address: {}", args.bind);

    let state = match args.data {
        Some(ref dir) => {
            info!("  Data directory: {}", dir.display());
            ServerState::open(dir)?
        }
        None => {
            info!("  Data directory: none (in-memory)");
            ServerState::in_memory()
        }
    };

    server::run(args.bind, state).await
}
