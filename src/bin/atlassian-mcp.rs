//! Stdio MCP server for Jira and Confluence
//!
//! Configuration comes from the environment (see `atlassian_mcp_bridge::config`).
//! Logs go to stderr; stdout carries the MCP protocol.

use atlassian_mcp_bridge::config::Config;
use atlassian_mcp_bridge::http::AtlassianHttpGateway;
use atlassian_mcp_bridge::mcp::AtlassianMcpServer;
use rmcp::ServiceExt;
use std::sync::Arc;

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(config.log_level.as_deref().unwrap_or("info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    init_logging(&config);

    let gateway = match AtlassianHttpGateway::from_config(&config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let products = gateway
        .products()
        .iter()
        .map(|p| p.display_name())
        .collect::<Vec<_>>()
        .join(", ");
    tracing::info!(
        version = atlassian_mcp_bridge::VERSION,
        "Atlassian MCP server ready ({products})"
    );

    let service = AtlassianMcpServer::new(Arc::new(gateway))
        .serve(rmcp::transport::stdio())
        .await?;
    service.waiting().await?;
    Ok(())
}
