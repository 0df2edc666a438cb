// src/server/mod.rs
//! HTTP front end for the workbench
//!
//! This module provides an axum server that:
//! - Manages session lifetimes (create, inspect, delete)
//! - Reads and writes recipes inside a session
//! - Copies, templates and git-pins recipes
//! - Streams `spack install` and validation output as Server-Sent Events
//!
//! An idle sweeper removes sessions past their TTL while the server runs.

mod error;
mod handlers;
mod routes;

pub use error::{ApiError, ApiResult, Problem};
pub use routes::build_router;

use crate::config::RuntimeConfig;
use crate::facade::Workbench;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared server state
pub struct ServerState {
    pub workbench: Workbench,
    pub started_at: Instant,
}

impl ServerState {
    pub fn new(workbench: Workbench) -> Self {
        Self {
            workbench,
            started_at: Instant::now(),
        }
    }
}

/// Shared state type handed to handlers
pub type SharedState = Arc<ServerState>;

/// Start the server and run until Ctrl-C
pub async fn run_server(config: RuntimeConfig) -> Result<()> {
    tracing::info!("Starting scullery on {}", config.bind_addr);
    tracing::info!("Session root: {:?}", config.store.root);
    tracing::info!(
        "Upstream: {:?} pinned to {}",
        config.upstream.checkout,
        config.upstream.pin
    );
    match config.store.idle_ttl {
        Some(ttl) => tracing::info!("Idle session TTL: {}s", ttl.as_secs()),
        None => tracing::info!("Idle session sweeping disabled"),
    }

    let workbench = Workbench::from_config(&config).context("Failed to initialize workbench")?;

    if let Some(audit) = workbench.audit_naming() {
        if !audit.unused.is_empty() {
            tracing::warn!(
                "Naming prefixes with no matching upstream directory: {}",
                audit.unused.join(", ")
            );
        }
        tracing::debug!("Naming prefixes confirmed: {}", audit.confirmed.join(", "));
    }

    let shutdown = CancellationToken::new();
    let sweeper = match config.store.idle_ttl {
        Some(_) => Some(
            workbench
                .store()
                .clone()
                .spawn_sweeper(config.sweep_interval, shutdown.clone()),
        ),
        None => None,
    };

    let state = Arc::new(ServerState::new(workbench));
    let app = build_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Scullery is ready to serve");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Received shutdown signal");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    tracing::info!("Server stopped");
    Ok(())
}
