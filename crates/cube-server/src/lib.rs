//! Cube MCP server: exposes a Cube semantic layer to MCP clients over stdio.

pub mod cli;
pub mod handler;
pub mod logging;

use anyhow::Context as _;
use cube_mcp_client::{CubeClient, CubeService, ResourceStore};
use rmcp::ServiceExt as _;
use std::sync::Arc;
use tracing::info;

pub use cli::Cli;
pub use handler::CubeMcpServer;

/// Connect to Cube and serve MCP on stdin/stdout until the client goes away.
///
/// # Errors
///
/// Fails on invalid configuration, rejected credentials, or a transport failure.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.cube_config()?;
    let client = CubeClient::connect(&config, cli.retry_policy())
        .await
        .context("connect to Cube")?;
    let store = ResourceStore::new(cli.retention());
    let server = CubeMcpServer::new(CubeService::new(Arc::new(client), store));

    info!("starting Cube MCP server");
    let running = server
        .serve(rmcp::transport::stdio())
        .await
        .context("start MCP stdio transport")?;
    let reason = running.waiting().await.context("MCP server task failed")?;
    info!(?reason, "Cube MCP server stopped");
    Ok(())
}
