//! # Atlassian MCP Bridge
//!
//! Authenticated, retrying HTTP access to Jira and Confluence for MCP servers.
//! Async/await, strong typing, tokio-based.
//!
//! ## Quick Start
//!
//! Build a gateway from the environment and call the REST API:
//!
//! ```no_run
//! use atlassian_mcp_bridge::{AtlassianHttpGateway, Config, Product};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let gateway = AtlassianHttpGateway::from_config(&config).await?;
//!
//!     let me: Value = gateway.get(Product::Jira, "/rest/api/3/myself", None).await?;
//!     println!("Signed in as {}", me["displayName"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Per-product gateway with [`AtlassianHttpGateway`]
//!
//! One client per configured product. Every call resolves a fresh
//! `Authorization` header, retries transient failures with linear backoff and
//! turns failures into [`AtlassianApiError`] with a classified [`ErrorCode`]:
//!
//! ```no_run
//! # use atlassian_mcp_bridge::{AtlassianHttpGateway, Product, RequestOptions};
//! # use serde_json::{json, Value};
//! # async fn example(gateway: AtlassianHttpGateway) -> atlassian_mcp_bridge::Result<()> {
//! let options = RequestOptions::with_query([("jql", "project = OPS"), ("maxResults", "20")]);
//! let issues: Value = gateway
//!     .get(Product::Jira, "/rest/api/3/search/jql", Some(&options))
//!     .await?;
//!
//! let page: Value = gateway
//!     .post(
//!         Product::Confluence,
//!         "/rest/api/content",
//!         Some(&json!({"type": "page", "title": "Notes", "space": {"key": "OPS"}})),
//!         None,
//!     )
//!     .await?;
//! # let _ = (issues, page);
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Authentication with [`auth`]
//!
//! Static credentials (Personal Access Token or e-mail plus API token) or OAuth
//! 2.0 (3LO) with a local browser callback, persistent tokens and single-flight
//! refresh. See the [`auth`] module.
//!
//! ### 3. MCP tools with rmcp
//!
//! Enable the `rmcp` feature for [`mcp::AtlassianMcpServer`] and the
//! `atlassian-mcp` stdio binary.
//!
//! ## Architecture
//!
//! - [`config`]: Environment-derived configuration and validation
//! - [`auth`]: Token storage, OAuth flow, credential resolution
//! - [`http`]: Product clients, retry policy, gateway
//! - [`types`]: Product identifiers and request options
//! - [`error`]: Error codes and classification
//! - `mcp`: MCP server (requires `rmcp`)
//!
//! ## Feature Flags
//!
//! - `rmcp` - MCP server and the `atlassian-mcp` binary via the official rmcp crate
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Credentials and tokens are never logged. To see logs, attach a subscriber:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt().with_writer(std::io::stderr).init();
//! ```
//!
//! ## Error Handling
//!
//! All gateway operations return [`Result<T, AtlassianApiError>`](Result):
//!
//! ```no_run
//! # use atlassian_mcp_bridge::{AtlassianHttpGateway, ErrorCode, Product};
//! # use serde_json::Value;
//! # async fn example(gateway: AtlassianHttpGateway) {
//! match gateway.get::<Value>(Product::Jira, "/rest/api/3/issue/OPS-1", None).await {
//!     Ok(issue) => println!("{}", issue["fields"]["summary"]),
//!     Err(e) if e.code == ErrorCode::NotFound => eprintln!("No such issue"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
#[cfg(feature = "rmcp")]
pub mod mcp;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use auth::{CredentialResolver, Credentials, OAuthError, OAuthManager, OAuthTokens, TokenStore};
pub use config::{Config, ConfigError, HttpConfig};
pub use error::{AtlassianApiError, ErrorCode, Result};
pub use http::{AtlassianHttpGateway, RetryConfig, RetryPolicy};
pub use types::{Product, RequestOptions};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
