// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gantry API Server
//!
//! An HTTP server responsible for:
//! - Workflow operations (create, list, retry, resume, stop, logs)
//! - Template, cron, and event binding resources
//! - The workflow archive and semaphore limits
//! - Artifact downloads

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use gantry_server::{Config, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_server=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Supervisor loop: SIGHUP tears the server down and rebuilds it from the
    // current environment; SIGINT/SIGTERM exit.
    loop {
        let config = Config::from_env()?;
        info!(
            addr = %config.bind_addr,
            cluster = %config.cluster_host,
            modes = ?config.auth_modes,
            "Starting Gantry API server"
        );
        let server = Server::build(config).await?;

        let restarting = Arc::new(AtomicBool::new(false));
        let flag = restarting.clone();
        let mut reload = signal(SignalKind::hangup())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let shutdown = async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
                _ = reload.recv() => flag.store(true, Ordering::SeqCst),
            }
        };
        server.run(shutdown).await?;

        if restarting.load(Ordering::SeqCst) {
            info!("Reload signal received; restarting");
            continue;
        }
        info!("Shutdown signal received");
        break;
    }

    info!("Gantry API server shut down");
    Ok(())
}
