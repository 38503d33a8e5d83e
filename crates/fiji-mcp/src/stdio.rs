//! Stdio MCP transport for Claude Code and other stdio-based clients.
//!
//! stdout carries JSON-RPC frames, so all logging goes to stderr.

use anyhow::{Context, Result};
use fijihost::HostHandle;
use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;
use tracing::info;

use crate::tools::FijiServer;

/// Run the MCP server over stdin/stdout until EOF, then shut the host down.
pub async fn run(host: Arc<HostHandle>) -> Result<()> {
    let service = FijiServer::new(Arc::clone(&host))
        .serve(stdio())
        .await
        .context("Failed to start stdio MCP service")?;

    info!(host = %host.describe(), "Stdio MCP server running");

    let reason = service.waiting().await?;
    info!(?reason, "Stdio MCP server stopped");

    host.shutdown().await;
    Ok(())
}
