//! Per-product HTTP gateway for the Jira and Confluence REST APIs

use super::retry::{RetryConfig, RetryPolicy};
use crate::auth::{CredentialResolver, OAuthManager};
use crate::config::{Config, HttpConfig};
use crate::error::{AtlassianApiError, ErrorCode, Result, TransportFailure};
use crate::types::{Product, RequestOptions};
use crate::utils::parse_retry_after;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// HTTP client bound to one product's base URL
#[derive(Debug, Clone)]
pub struct ProductClient {
    base_url: String,
    http: reqwest::Client,
}

impl ProductClient {
    /// Build a client with JSON default headers and the configured timeout
    ///
    /// # Errors
    ///
    /// Returns `INVALID_CONFIGURATION` if the base URL is not a valid http(s)
    /// URL or the client cannot be built.
    pub fn new(product: Product, base_url: &str, http: &HttpConfig) -> Result<Self> {
        let parsed = url::Url::parse(base_url).map_err(|e| {
            AtlassianApiError::invalid_configuration(format!(
                "{}: invalid base URL {base_url:?}: {e}",
                product.display_name()
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AtlassianApiError::invalid_configuration(format!(
                "{}: base URL must use http or https, got {base_url:?}",
                product.display_name()
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("atlassian-mcp-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(http.timeout)
            .build()
            .map_err(|e| {
                AtlassianApiError::invalid_configuration(format!(
                    "{}: could not build HTTP client: {e}",
                    product.display_name()
                ))
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: client,
        })
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Routes authenticated, retried REST calls to Jira and Confluence.
///
/// Holds at most one [`ProductClient`] per [`Product`]; calls to a product
/// without a client fail with `CLIENT_NOT_CONFIGURED` before any I/O.
#[derive(Debug, Clone)]
pub struct AtlassianHttpGateway {
    clients: HashMap<Product, ProductClient>,
    credentials: Arc<CredentialResolver>,
    retry: RetryPolicy,
}

impl AtlassianHttpGateway {
    /// Assemble a gateway from base URLs and a credential resolver
    ///
    /// # Errors
    ///
    /// Returns `INVALID_CONFIGURATION` if a base URL is unusable.
    pub fn new(
        base_urls: HashMap<Product, String>,
        credentials: CredentialResolver,
        http: &HttpConfig,
    ) -> Result<Self> {
        let mut clients = HashMap::with_capacity(base_urls.len());
        for (product, base_url) in base_urls {
            let client = ProductClient::new(product, &base_url, http)?;
            tracing::debug!(%product, base_url = client.base_url(), "Registered client");
            clients.insert(product, client);
        }

        Ok(Self {
            clients,
            credentials: Arc::new(credentials),
            retry: RetryPolicy::new(RetryConfig::from(http)),
        })
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = RetryPolicy::new(config);
        self
    }

    /// Gateway for static credentials: one client per configured product URL
    ///
    /// # Errors
    ///
    /// Returns `AUTHENTICATION_FAILED` if a configured product lacks credentials,
    /// or `INVALID_CONFIGURATION` for an unusable URL.
    pub fn from_static_credentials(config: &Config) -> Result<Self> {
        let credentials = CredentialResolver::from_config(config)?;
        let base_urls = Product::ALL
            .into_iter()
            .filter_map(|p| config.product(p).map(|c| (p, c.url.clone())))
            .collect();
        Self::new(base_urls, credentials, &config.http)
    }

    /// Gateway for OAuth mode: both products routed through the Atlassian API
    /// gateway for the stored site.
    ///
    /// Runs the authorization flow first if no tokens are stored.
    ///
    /// # Errors
    ///
    /// Returns `AUTHENTICATION_FAILED` if authorization fails.
    pub async fn from_oauth(config: &Config, manager: Arc<OAuthManager>) -> Result<Self> {
        let tokens = manager.ensure_authenticated().await?;
        tracing::info!(
            site = %tokens.site_name,
            cloud_id = %tokens.cloud_id,
            "Using OAuth authentication"
        );

        let base_urls = Product::ALL
            .into_iter()
            .map(|p| (p, manager.endpoints().product_base_url(p, &tokens.cloud_id)))
            .collect();
        Self::new(base_urls, CredentialResolver::oauth(manager), &config.http)
    }

    /// Validate `config` and build the gateway for whichever mode it selects
    ///
    /// # Errors
    ///
    /// Returns `INVALID_CONFIGURATION` if validation fails, otherwise any error
    /// from [`Self::from_oauth`] or [`Self::from_static_credentials`].
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        match &config.oauth {
            Some(settings) => {
                let manager = Arc::new(OAuthManager::new(settings.clone()));
                Self::from_oauth(config, manager).await
            }
            None => Self::from_static_credentials(config),
        }
    }

    /// Whether a client is registered for `product`
    #[must_use]
    pub fn is_configured(&self, product: Product) -> bool {
        self.clients.contains_key(&product)
    }

    /// Registered products
    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        let mut products: Vec<_> = self.clients.keys().copied().collect();
        products.sort();
        products
    }

    /// Credential resolver in use
    #[must_use]
    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    /// `GET` a JSON resource
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        product: Product,
        path: &str,
        options: Option<&RequestOptions>,
    ) -> Result<T> {
        self.request(product, Method::GET, path, None, options).await
    }

    /// `POST` with an optional JSON body
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn post<T: DeserializeOwned>(
        &self,
        product: Product,
        path: &str,
        body: Option<&Value>,
        options: Option<&RequestOptions>,
    ) -> Result<T> {
        self.request(product, Method::POST, path, body, options).await
    }

    /// `PUT` with an optional JSON body
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn put<T: DeserializeOwned>(
        &self,
        product: Product,
        path: &str,
        body: Option<&Value>,
        options: Option<&RequestOptions>,
    ) -> Result<T> {
        self.request(product, Method::PUT, path, body, options).await
    }

    /// `DELETE` a resource
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn delete<T: DeserializeOwned>(
        &self,
        product: Product,
        path: &str,
        options: Option<&RequestOptions>,
    ) -> Result<T> {
        self.request(product, Method::DELETE, path, None, options).await
    }

    /// Send a request with retries and decode the JSON response.
    ///
    /// A `204` or empty body decodes from JSON `null`, so `T` should be
    /// [`Value`], `()` or an `Option` for such endpoints.
    ///
    /// # Errors
    ///
    /// - `CLIENT_NOT_CONFIGURED` if `product` has no client
    /// - `AUTHENTICATION_FAILED` if no credential can be resolved
    /// - the classified upstream or transport error once retries are exhausted
    pub async fn request<T: DeserializeOwned>(
        &self,
        product: Product,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: Option<&RequestOptions>,
    ) -> Result<T> {
        let client = self
            .clients
            .get(&product)
            .ok_or_else(|| AtlassianApiError::client_not_configured(product))?;
        let url = client.url(path);
        let url = url.as_str();

        let value = self
            .retry
            .execute(|attempt| {
                self.send_once(product, client, method.clone(), url, body, options, attempt)
            })
            .await?;

        serde_json::from_value(value).map_err(|e| {
            AtlassianApiError::for_product(
                product,
                ErrorCode::UnknownError,
                format!("Unexpected response shape: {e}"),
            )
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_once(
        &self,
        product: Product,
        client: &ProductClient,
        method: Method,
        url: &str,
        body: Option<&Value>,
        options: Option<&RequestOptions>,
        attempt: u32,
    ) -> Result<Value> {
        let auth_header = self.credentials.resolve_auth_header(product).await?;

        let mut request = client.http.request(method.clone(), url);
        if let Some(options) = options {
            if !options.query.is_empty() {
                request = request.query(&options.query);
            }
            for (name, value) in &options.headers {
                if name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                    continue;
                }
                request = request.header(name.as_str(), value.as_str());
            }
        }
        request = request.header(AUTHORIZATION, auth_header);
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%product, %method, url, attempt, "API request");

        let response = request.send().await.map_err(|e| {
            let err = AtlassianApiError::from_transport(TransportFailure::from_reqwest(&e), product);
            tracing::error!(%product, %method, url, code = %err.code, "API request failed: {e}");
            err
        })?;

        let status = response.status();
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let text = response.text().await.map_err(|e| {
            AtlassianApiError::from_transport(TransportFailure::from_reqwest(&e), product)
        })?;

        tracing::debug!(%product, %method, url, status = status.as_u16(), "API response");

        if !status.is_success() {
            let body = (!text.trim().is_empty())
                .then(|| serde_json::from_str(&text).unwrap_or(Value::String(text)));
            let err = AtlassianApiError::from_transport(
                TransportFailure::Status {
                    status: status.as_u16(),
                    body,
                    retry_after,
                },
                product,
            );
            tracing::error!(
                %product,
                %method,
                url,
                status = status.as_u16(),
                code = %err.code,
                "API error: {}",
                err.message
            );
            return Err(err);
        }

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            AtlassianApiError::for_product(
                product,
                ErrorCode::UnknownError,
                format!("Invalid JSON response: {e}"),
            )
        })
    }
}
