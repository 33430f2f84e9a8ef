//! MCP server exposing the gateway as tools

use crate::auth::CredentialResolver;
use crate::http::AtlassianHttpGateway;
use crate::types::{Product, RequestOptions};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// HTTP verb accepted by the request tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Read a resource
    Get,
    /// Create a resource or run a search
    Post,
    /// Replace or update a resource
    Put,
    /// Remove a resource
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Arguments for `jira_request` / `confluence_request`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ApiRequestParams {
    /// HTTP method
    pub method: HttpMethod,
    /// REST path relative to the product base URL, e.g. `/rest/api/3/issue/PROJ-1`
    pub path: String,
    /// Query string parameters
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// JSON request body for POST and PUT
    #[serde(default)]
    pub body: Option<Value>,
}

/// MCP server with one generic request tool per product
#[derive(Clone)]
pub struct AtlassianMcpServer {
    gateway: Arc<AtlassianHttpGateway>,
    tool_router: ToolRouter<Self>,
}

impl AtlassianMcpServer {
    /// Wrap a configured gateway
    pub fn new(gateway: Arc<AtlassianHttpGateway>) -> Self {
        Self {
            gateway,
            tool_router: Self::tool_router(),
        }
    }

    async fn forward(&self, product: Product, params: ApiRequestParams) -> Result<String, String> {
        let options = RequestOptions::with_query(params.query);
        let result = self
            .gateway
            .request::<Value>(
                product,
                params.method.into(),
                &params.path,
                params.body.as_ref(),
                Some(&options),
            )
            .await;

        match result {
            Ok(Value::Null) => Ok("Success (no content)".to_string()),
            Ok(value) => serde_json::to_string_pretty(&value).map_err(|e| format!("Error: {e}")),
            Err(e) => {
                tracing::warn!(%product, code = %e.code, "Tool call failed");
                Err(format!("Error: {e}"))
            }
        }
    }

    async fn status_report(&self) -> Value {
        let products: Vec<_> = self
            .gateway
            .products()
            .into_iter()
            .map(|p| p.as_str())
            .collect();

        match self.gateway.credentials() {
            CredentialResolver::Static(_) => serde_json::json!({
                "mode": "static",
                "products": products,
            }),
            CredentialResolver::OAuth(manager) => {
                let tokens = manager.current_tokens().await;
                serde_json::json!({
                    "mode": "oauth",
                    "products": products,
                    "state": format!("{:?}", manager.state()),
                    "site": tokens.as_ref().map(|t| serde_json::json!({
                        "name": t.site_name,
                        "url": t.site_url,
                        "cloudId": t.cloud_id,
                    })),
                    "expiresInSeconds": tokens
                        .as_ref()
                        .and_then(|t| t.remaining_validity())
                        .map(|d| d.as_secs()),
                })
            }
        }
    }
}

#[tool_router]
impl AtlassianMcpServer {
    /// Forward a request to Jira
    #[tool(description = "Call the Jira REST API. Path is relative to the Jira base URL, e.g. /rest/api/3/search/jql")]
    pub async fn jira_request(
        &self,
        Parameters(params): Parameters<ApiRequestParams>,
    ) -> Result<String, String> {
        self.forward(Product::Jira, params).await
    }

    /// Forward a request to Confluence
    #[tool(description = "Call the Confluence REST API. Path is relative to the Confluence base URL, e.g. /rest/api/content")]
    pub async fn confluence_request(
        &self,
        Parameters(params): Parameters<ApiRequestParams>,
    ) -> Result<String, String> {
        self.forward(Product::Confluence, params).await
    }

    /// Authentication summary as pretty-printed JSON
    #[tool(description = "Show the authentication mode, configured products and OAuth token status")]
    pub async fn auth_status(&self) -> String {
        let report = self.status_report().await;
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| report.to_string())
    }
}

#[tool_handler]
impl ServerHandler for AtlassianMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Raw access to the Jira and Confluence REST APIs with shared authentication and retries."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
