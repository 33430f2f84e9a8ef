//! Integration tests for the HTTP gateway against a mock Atlassian server

use atlassian_mcp_bridge::config::ProductConfig;
use atlassian_mcp_bridge::{
    AtlassianHttpGateway, Config, ErrorCode, HttpConfig, Product, RequestOptions,
};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn fast_http() -> HttpConfig {
    HttpConfig::builder()
        .timeout(Duration::from_secs(5))
        .retry_delay(Duration::from_millis(10))
        .build()
}

fn jira_pat_config(url: &str) -> Config {
    let mut jira = ProductConfig::new(url);
    jira.personal_token = Some("pat-123".into());
    Config {
        jira: Some(jira),
        http: fast_http(),
        ..Default::default()
    }
}

// ============================================================================
// Routing and credentials
// ============================================================================

#[tokio::test]
async fn test_personal_token_only_jira() -> anyhow::Result<()> {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/myself"))
        .and(header("authorization", "Bearer pat-123"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"displayName": "Ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;

    let me: Value = gateway.get(Product::Jira, "/rest/api/3/myself", None).await?;
    assert_eq!(me["displayName"], "Ada");

    let err = gateway
        .get::<Value>(Product::Confluence, "/rest/api/content", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ClientNotConfigured);
    Ok(())
}

#[tokio::test]
async fn test_basic_auth_header() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/space"))
        .and(header(
            "authorization",
            "Basic dXNlckBleGFtcGxlLmNvbTp0b2tlbjEyMw==",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut confluence = ProductConfig::new(format!("{}/wiki", server.uri()));
    confluence.username = Some("user@example.com".into());
    confluence.api_token = Some("token123".into());
    let config = Config {
        confluence: Some(confluence),
        http: fast_http(),
        ..Default::default()
    };

    let gateway = AtlassianHttpGateway::from_static_credentials(&config)?;
    let spaces: Value = gateway
        .get(Product::Confluence, "rest/api/space", None)
        .await?;
    assert_eq!(spaces["results"], json!([]));
    Ok(())
}

#[tokio::test]
async fn test_query_headers_and_body_forwarded() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue"))
        .and(query_param("updateHistory", "true"))
        .and(header("x-atlassian-token", "no-check"))
        .and(header("authorization", "Bearer pat-123"))
        .and(body_json(json!({"fields": {"summary": "Broken build"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"key": "OPS-7"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let options = RequestOptions::with_query([("updateHistory", "true")])
        .header("X-Atlassian-Token", "no-check")
        .header("Authorization", "Bearer forged");

    let created: Value = gateway
        .post(
            Product::Jira,
            "/rest/api/3/issue",
            Some(&json!({"fields": {"summary": "Broken build"}})),
            Some(&options),
        )
        .await?;
    assert_eq!(created["key"], "OPS-7");
    Ok(())
}

#[tokio::test]
async fn test_no_content_decodes_as_null() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/api/3/issue/OPS-7"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/rest/api/3/issue/OPS-8"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;

    let deleted: Value = gateway
        .delete(Product::Jira, "/rest/api/3/issue/OPS-7", None)
        .await?;
    assert_eq!(deleted, Value::Null);

    let updated: Option<Value> = gateway
        .put(
            Product::Jira,
            "/rest/api/3/issue/OPS-8",
            Some(&json!({"fields": {}})),
            None,
        )
        .await?;
    assert!(updated.is_none());
    Ok(())
}

// ============================================================================
// Error classification
// ============================================================================

#[tokio::test]
async fn test_not_found_is_classified_and_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/NOPE-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorMessages": ["Issue does not exist or you do not have permission to see it."],
            "errors": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let err = gateway
        .get::<Value>(Product::Jira, "/rest/api/3/issue/NOPE-1", None)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.status, Some(404));
    assert_eq!(err.product, Some(Product::Jira));
    assert_eq!(
        err.message,
        "Jira: Issue does not exist or you do not have permission to see it."
    );
    assert!(err.response_body.is_some());
    assert!(err.to_string().ends_with("[NOT_FOUND] (HTTP 404)"));
    Ok(())
}

#[tokio::test]
async fn test_plain_text_error_body() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized; scheme=Bearer"))
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let err = gateway
        .get::<Value>(Product::Jira, "/rest/api/3/myself", None)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Unauthorized);
    assert_eq!(err.message, "Jira: Unauthorized; scheme=Bearer");
    Ok(())
}

#[tokio::test]
async fn test_empty_error_body_uses_status_message() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let err = gateway
        .get::<Value>(Product::Jira, "/rest/api/3/myself", None)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Forbidden);
    assert_eq!(err.message, "Jira: API Error (403)");
    assert!(err.response_body.is_none());
    Ok(())
}

#[tokio::test]
async fn test_invalid_success_body() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let err = gateway
        .get::<Value>(Product::Jira, "/rest/api/3/myself", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownError);
    Ok(())
}

#[tokio::test]
async fn test_connection_refused() -> anyhow::Result<()> {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };

    let mut config = jira_pat_config(&format!("http://127.0.0.1:{port}"));
    config.http.max_retries = 1;
    let gateway = AtlassianHttpGateway::from_static_credentials(&config)?;

    let err = gateway
        .get::<Value>(Product::Jira, "/rest/api/3/myself", None)
        .await
        .unwrap_err();
    assert!(
        matches!(err.code, ErrorCode::ConnectionRefused | ErrorCode::NetworkError),
        "unexpected code {:?}",
        err.code
    );
    assert!(err.is_retryable());
    assert!(err.status.is_none());
    Ok(())
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test]
async fn test_transient_failures_are_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/myself"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/myself"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accountId": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let me: Value = gateway.get(Product::Jira, "/rest/api/3/myself", None).await?;
    assert_eq!(me["accountId"], "abc");
    Ok(())
}

#[tokio::test]
async fn test_retries_exhausted() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let err = gateway
        .get::<Value>(Product::Jira, "/rest/api/3/myself", None)
        .await
        .unwrap_err();
    assert_eq!(err.status, Some(502));
    assert_eq!(err.code, ErrorCode::UnknownError);
    assert_eq!(err.message, "Jira: Bad Gateway");
    Ok(())
}

#[tokio::test]
async fn test_slow_upstream_times_out_and_is_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"late": true}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut config = jira_pat_config(&server.uri());
    config.http = HttpConfig::builder()
        .timeout(Duration::from_millis(100))
        .retry_delay(Duration::from_millis(10))
        .build();
    let gateway = AtlassianHttpGateway::from_static_credentials(&config)?;

    let err = gateway
        .get::<Value>(Product::Jira, "/rest/api/3/myself", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
    assert_eq!(err.status, None);
    assert_eq!(err.to_string(), "Jira: Request timeout [TIMEOUT]");

    let attempts = server.received_requests().await.map_or(0, |r| r.len());
    assert_eq!(attempts, config.http.max_retries as usize);
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = AtlassianHttpGateway::from_static_credentials(&jira_pat_config(&server.uri()))?;
    let start = Instant::now();
    let body: Value = gateway.get(Product::Jira, "/rest/api/3/myself", None).await?;

    assert_eq!(body["ok"], true);
    // retry-after (1s) replaces the 10ms linear delay
    assert!(start.elapsed() >= Duration::from_secs(1));
    Ok(())
}
