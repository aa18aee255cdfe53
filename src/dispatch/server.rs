//! Server assembly: routes, state wiring, listener, and shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tracing::info;

use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, DispatchDb};
use super::hub::ConnectionRegistry;
use super::ws;

pub const DEFAULT_PORT: u16 = 8187;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Relaxes CORS and binds to loopback only.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(".brigade/dispatch.db"),
            dev_mode: false,
        }
    }
}

/// Mount the REST surface plus the realtime socket on shared state.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir {}", parent.display()))?;
        }
    }

    let db = DispatchDb::new(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        registry: Arc::new(ConnectionRegistry::new()),
    });

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode {
        "127.0.0.1"
    } else {
        "0.0.0.0"
    };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(addr = %addr, db = %config.db_path.display(), "dispatch server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}
