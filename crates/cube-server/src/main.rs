use cube_mcp_server::Cli;
use cube_mcp_server::logging::{self, LogOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse_with_extras();
    let _log_guard = logging::init(&LogOptions {
        level: &cli.log_level,
        dir: cli.log_dir.as_deref(),
        json: cli.log_json,
    })?;

    if let Err(e) = cube_mcp_server::run(cli).await {
        tracing::error!(error = %format!("{e:#}"), "Cube MCP server failed");
        return Err(e);
    }
    Ok(())
}
