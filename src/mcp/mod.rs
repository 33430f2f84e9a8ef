//! MCP (Model Context Protocol) front end, built on [rmcp](https://crates.io/crates/rmcp)
//!
//! Requires the `rmcp` feature:
//!
//! ```toml
//! [dependencies]
//! atlassian-mcp-bridge = { version = "0.1", features = ["rmcp"] }
//! ```
//!
//! [`AtlassianMcpServer`] exposes three tools:
//!
//! - `jira_request` / `confluence_request`: `method`, `path`, optional `query` and
//!   `body`, forwarded through the gateway. Failures come back as error results
//!   with the text `Error: <message>`.
//! - `auth_status`: authentication mode, registered products and OAuth token state.
//!
//! ```ignore
//! use atlassian_mcp_bridge::mcp::AtlassianMcpServer;
//! use rmcp::ServiceExt;
//!
//! let server = AtlassianMcpServer::new(gateway);
//! let service = server.serve(rmcp::transport::stdio()).await?;
//! service.waiting().await?;
//! ```

mod server;

pub use server::{ApiRequestParams, AtlassianMcpServer, HttpMethod};
