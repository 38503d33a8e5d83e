//! Streamable HTTP MCP server.
//!
//! MCP is mounted at `/mcp`; `/health` reports uptime and host state.

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use fijihost::HostHandle;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::tools::FijiServer;

/// Server configuration
pub struct ServeConfig {
    /// `host:port` to bind
    pub addr: String,
}

/// Server state for health endpoint
#[derive(Clone)]
pub struct HealthState {
    pub host: Arc<HostHandle>,
    pub start_time: Instant,
}

/// Health check endpoint
pub async fn handle_health(State(state): State<HealthState>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed();

    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime.as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "host": {
            "backend": state.host.describe(),
            "initialized": state.host.is_initialized(),
            "launch_attempts": state.host.launch_attempts(),
        }
    }))
}

/// Build the HTTP router: MCP at `/mcp`, health at `/health`.
pub fn router(host: Arc<HostHandle>) -> Router {
    let factory_host = Arc::clone(&host);
    let mcp_service = StreamableHttpService::new(
        move || Ok(FijiServer::new(Arc::clone(&factory_host))),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let health_state = HealthState {
        host,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/health", get(handle_health))
        .with_state(health_state)
        .nest_service("/mcp", mcp_service)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until SIGINT/SIGTERM, then shut the host down.
pub async fn run(config: ServeConfig, host: Arc<HostHandle>) -> Result<()> {
    info!("🔬 fiji-mcp HTTP server starting");
    info!("   Host: {}", host.describe());

    let app = router(Arc::clone(&host));

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    info!("🔬 fiji-mcp ready!");
    info!("   MCP (Streamable): POST http://{}/mcp", config.addr);
    info!("   Health: GET http://{}/health", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    host.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
