// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! pasty-server: WebSocket and HTTP server for the pasty text drop.
//!
//! Stores short texts under four-letter identifiers, answers save and
//! retrieve requests over the WebSocket channel, and broadcasts the stored
//! count to every connected client whenever it changes.

mod rate_limit;
mod server;
mod state;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use state::ServerState;

/// pasty-server: Text drop server with live item count
#[derive(Parser, Debug)]
#[command(name = "pasty-server")]
#[command(about = "WebSocket and HTTP server for the pasty text drop")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, env = "PASTY_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// SQLite database file
    #[arg(short, long, env = "PASTY_DATABASE", default_value = "pasty.db")]
    database: PathBuf,

    /// Hours a text is kept after it is saved
    #[arg(long, env = "EXPIRATION_HOURS", default_value = "24")]
    expiration_hours: u32,

    /// Seconds between background purges of expired texts
    #[arg(long, env = "PASTY_PURGE_INTERVAL", default_value = "300")]
    purge_interval: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting pasty-server");
    info!("  Bind address: {}", args.bind);
    info!("  Database: {}", args.database.display());
    info!("  Expiration: {}h", args.expiration_hours);

    let expiration = TimeDelta::hours(i64::from(args.expiration_hours));
    let state = ServerState::open(&args.database, expiration)?;

    match state.purge_expired().await {
        Ok(removed) => info!("Database ready ({} expired texts removed)", removed),
        Err(e) => error!("Initial purge failed: {}", e),
    }

    let purge_state = state.clone();
    let purge_every = Duration::from_secs(args.purge_interval.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = purge_state.purge_expired().await {
                error!("Background purge failed: {}", e);
            }
        }
    });

    server::run(args.bind, state).await?;

    Ok(())
}
