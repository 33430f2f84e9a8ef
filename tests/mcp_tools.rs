//! MCP tool behaviour against a mock Jira (requires `--features rmcp`)

#![cfg(feature = "rmcp")]

use atlassian_mcp_bridge::config::ProductConfig;
use atlassian_mcp_bridge::mcp::{ApiRequestParams, AtlassianMcpServer, HttpMethod};
use atlassian_mcp_bridge::{AtlassianHttpGateway, Config, HttpConfig};
use rmcp::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn server_for(url: &str) -> AtlassianMcpServer {
    let mut jira = ProductConfig::new(url);
    jira.personal_token = Some("pat".into());
    let config = Config {
        jira: Some(jira),
        http: HttpConfig::builder()
            .retry_delay(Duration::from_millis(10))
            .build(),
        ..Default::default()
    };
    let gateway = AtlassianHttpGateway::from_static_credentials(&config).expect("gateway");
    AtlassianMcpServer::new(Arc::new(gateway))
}

fn params(method: HttpMethod, path: &str) -> ApiRequestParams {
    ApiRequestParams {
        method,
        path: path.to_string(),
        query: BTreeMap::new(),
        body: None,
    }
}

#[tokio::test]
async fn test_jira_request_returns_json_text() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/search/jql"))
        .and(query_param("jql", "project = OPS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": [{"key": "OPS-1"}]})))
        .mount(&mock)
        .await;

    let server = server_for(&mock.uri());
    let mut request = params(HttpMethod::Get, "/rest/api/3/search/jql");
    request.query.insert("jql".into(), "project = OPS".into());

    let text = server.jira_request(Parameters(request)).await.unwrap();
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["issues"][0]["key"], "OPS-1");
}

#[tokio::test]
async fn test_errors_are_prefixed() {
    let mock = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errorMessages": ["Gone"]})))
        .mount(&mock)
        .await;

    let server = server_for(&mock.uri());
    let err = server
        .jira_request(Parameters(params(HttpMethod::Delete, "/rest/api/3/issue/OPS-1")))
        .await
        .unwrap_err();
    assert_eq!(err, "Error: Jira: Gone [NOT_FOUND] (HTTP 404)");

    let err = server
        .confluence_request(Parameters(params(HttpMethod::Get, "/rest/api/content")))
        .await
        .unwrap_err();
    assert!(err.starts_with("Error: Confluence: confluence client not configured"));
    assert!(err.ends_with("[CLIENT_NOT_CONFIGURED]"));
}

#[tokio::test]
async fn test_auth_status_static() {
    let server = server_for("https://x.atlassian.net");
    let report: Value = serde_json::from_str(&server.auth_status().await).unwrap();
    assert_eq!(report["mode"], "static");
    assert_eq!(report["products"], json!(["jira"]));
}

#[test]
fn test_params_schema_accepts_uppercase_methods() {
    let parsed: ApiRequestParams =
        serde_json::from_value(json!({"method": "PUT", "path": "/x", "body": {"a": 1}})).unwrap();
    assert_eq!(parsed.method, HttpMethod::Put);
    assert!(parsed.query.is_empty());
    assert_eq!(parsed.body, Some(json!({"a": 1})));
}

#[test]
fn test_server_info_enables_tools() {
    let info = server_for("https://x.atlassian.net").get_info();
    assert!(info.capabilities.tools.is_some());
    assert!(info.instructions.is_some());
}
