//! Atlassian OAuth 2.0 (3LO) authorization-code flow and token refresh

use super::callback::{CALLBACK_PATH, CallbackListener};
use super::token::{OAuthTokens, TokenError, TokenStore};
use crate::config::OAuthSettings;
use crate::types::Product;
use crate::utils::{extract_error_message, now_millis, truncate_for_display};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

const DEFAULT_AUTH_URL: &str = "https://auth.atlassian.com/authorize";
const DEFAULT_TOKEN_URL: &str = "https://auth.atlassian.com/oauth/token";
const DEFAULT_API_BASE_URL: &str = "https://api.atlassian.com";
const AUDIENCE: &str = "api.atlassian.com";

/// Scopes requested for Jira and Confluence read/write access
pub const DEFAULT_SCOPES: &[&str] = &[
    "offline_access",
    "read:jira-work",
    "write:jira-work",
    "read:jira-user",
    "manage:jira-project",
    "read:confluence-content.all",
    "write:confluence-content",
    "read:confluence-space.summary",
    "write:confluence-file",
    "read:confluence-user",
];

/// How long the authorization flow waits for the browser callback
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Errors that can occur during OAuth operations
#[derive(Debug, Clone, Error)]
pub enum OAuthError {
    /// OAuth application settings are incomplete
    #[error("OAuth not configured: {0}")]
    NotConfigured(String),

    /// No token set has been stored yet
    #[error("No OAuth tokens found. Run the authorization flow first.")]
    NotAuthenticated,

    /// The token endpoint rejected the refresh token; stored tokens were removed
    #[error("Refresh token expired. Restart the MCP server to re-authenticate with Atlassian.")]
    RefreshTokenExpired,

    /// The user or authorization server denied access
    #[error("OAuth authorization denied: {0}")]
    AccessDenied(String),

    /// Callback `state` did not match the generated nonce
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Callback carried no authorization code
    #[error("OAuth callback is missing the authorization code")]
    MissingCode,

    /// No callback arrived in time
    #[error("Timed out waiting for OAuth callback after {seconds}s")]
    CallbackTimeout {
        /// Timeout in seconds
        seconds: u64,
    },

    /// The local callback listener could not start
    #[error("Could not start OAuth callback server on port {port}: {message}")]
    CallbackServer {
        /// Requested port
        port: u16,
        /// Underlying error
        message: String,
    },

    /// The token reaches no Atlassian site
    #[error("No accessible Atlassian sites for this token")]
    NoAccessibleSites,

    /// Token endpoint answered with an error status
    #[error("Token endpoint returned {status}: {message}")]
    TokenEndpoint {
        /// HTTP status
        status: u16,
        /// Upstream message
        message: String,
    },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Token storage error
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Browser could not be opened
    #[error("Could not open browser: {0}")]
    BrowserOpen(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<TokenError> for OAuthError {
    fn from(err: TokenError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<std::io::Error> for OAuthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for OAuth operations
pub type AuthResult<T> = Result<T, OAuthError>;

/// Atlassian endpoints used by the flow
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token exchange/refresh endpoint URL
    pub token_url: String,
    /// API gateway base (accessible resources, `/ex/<product>/<cloudId>`)
    pub api_base_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl OAuthEndpoints {
    /// Accessible-resources endpoint
    #[must_use]
    pub fn accessible_resources_url(&self) -> String {
        format!(
            "{}/oauth/token/accessible-resources",
            self.api_base_url.trim_end_matches('/')
        )
    }

    /// REST base URL for `product` on the site identified by `cloud_id`
    #[must_use]
    pub fn product_base_url(&self, product: Product, cloud_id: &str) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        match product {
            Product::Jira => format!("{base}/ex/jira/{cloud_id}"),
            Product::Confluence => format!("{base}/ex/confluence/{cloud_id}/wiki"),
        }
    }
}

/// Position in the authorization/refresh lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No usable tokens
    Unauthenticated,
    /// Browser opened, waiting for `/callback`
    AwaitingCallback,
    /// Exchanging the authorization code
    Exchanging,
    /// Tokens stored
    Authenticated,
    /// Refresh request in flight
    Refreshing,
}

/// OAuth response from token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

/// Atlassian site reachable with the granted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibleResource {
    /// Cloud ID
    pub id: String,
    /// Site name
    pub name: String,
    /// Site URL
    pub url: String,
    /// Scopes granted on this site
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Site avatar
    #[serde(default, rename = "avatarUrl", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Opens the authorization URL for the user
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::BrowserOpen`] if no browser could be launched.
    fn open(&self, url: &str) -> AuthResult<()>;
}

/// Launches the platform's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl SystemBrowser {
    #[cfg(target_os = "macos")]
    fn command(url: &str) -> (&'static str, Vec<String>) {
        ("open", vec![url.to_string()])
    }

    #[cfg(target_os = "windows")]
    fn command(url: &str) -> (&'static str, Vec<String>) {
        (
            "cmd",
            vec!["/C".into(), "start".into(), String::new(), url.to_string()],
        )
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn command(url: &str) -> (&'static str, Vec<String>) {
        ("xdg-open", vec![url.to_string()])
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        let (program, args) = Self::command(url);
        let program =
            which::which(program).map_err(|e| OAuthError::BrowserOpen(format!("{program}: {e}")))?;

        std::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| OAuthError::BrowserOpen(e.to_string()))?;
        Ok(())
    }
}

type RefreshFuture = Shared<BoxFuture<'static, AuthResult<OAuthTokens>>>;

/// Clears the in-flight refresh slot when the refresh future finishes or is dropped
struct InFlightRelease(Arc<Mutex<Option<RefreshFuture>>>);

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Builder for [`OAuthManager`]
pub struct OAuthManagerBuilder {
    settings: OAuthSettings,
    endpoints: Option<OAuthEndpoints>,
    store: Option<TokenStore>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    auto_open_browser: bool,
    auth_timeout: Duration,
    http_client: Option<reqwest::Client>,
}

impl OAuthManagerBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            settings,
            endpoints: None,
            store: None,
            browser: None,
            auto_open_browser: true,
            auth_timeout: AUTH_TIMEOUT,
            http_client: None,
        }
    }

    /// Override the Atlassian endpoints
    #[must_use]
    pub fn endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Set custom token storage
    #[must_use]
    pub fn store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom browser launcher
    #[must_use]
    pub fn browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Set whether to automatically open browser (default: true)
    #[must_use]
    pub fn auto_open_browser(mut self, auto_open: bool) -> Self {
        self.auto_open_browser = auto_open;
        self
    }

    /// How long to wait for the callback (default: 3 minutes)
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Use a preconfigured HTTP client for OAuth endpoints
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the manager
    #[must_use]
    pub fn build(self) -> OAuthManager {
        let browser = self
            .auto_open_browser
            .then(|| self.browser.unwrap_or_else(|| Arc::new(SystemBrowser)));
        let (state, _) = watch::channel(AuthState::Unauthenticated);

        OAuthManager {
            settings: self.settings,
            endpoints: self.endpoints.unwrap_or_default(),
            store: self.store.unwrap_or_default(),
            browser,
            auth_timeout: self.auth_timeout,
            http: self.http_client.unwrap_or_default(),
            in_flight: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
        }
    }
}

/// Owns the OAuth token lifecycle for this installation.
///
/// Clones share the refresh slot and state channel, so a manager can be handed
/// to several tasks while still issuing at most one refresh at a time.
#[derive(Clone)]
pub struct OAuthManager {
    settings: OAuthSettings,
    endpoints: OAuthEndpoints,
    store: TokenStore,
    browser: Option<Arc<dyn BrowserLauncher>>,
    auth_timeout: Duration,
    http: reqwest::Client,
    in_flight: Arc<Mutex<Option<RefreshFuture>>>,
    state: Arc<watch::Sender<AuthState>>,
}

impl std::fmt::Debug for OAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthManager")
            .field("settings", &self.settings)
            .field("endpoints", &self.endpoints)
            .field("store", &self.store)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl OAuthManager {
    /// Create a manager with default endpoints, storage and browser
    #[must_use]
    pub fn new(settings: OAuthSettings) -> Self {
        Self::builder(settings).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(settings: OAuthSettings) -> OAuthManagerBuilder {
        OAuthManagerBuilder::new(settings)
    }

    /// OAuth application settings
    #[must_use]
    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Endpoints in use
    #[must_use]
    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    /// Token storage
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Watch lifecycle state changes
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: AuthState) {
        self.state.send_replace(state);
    }

    /// Whether `tokens` are due for refresh
    #[must_use]
    pub fn is_token_expired(tokens: &OAuthTokens) -> bool {
        tokens.is_expired()
    }

    /// Stored tokens, without refreshing
    pub async fn current_tokens(&self) -> Option<OAuthTokens> {
        self.store.load().await
    }

    /// Stored tokens, or run the authorization flow if there are none
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization flow fails.
    pub async fn ensure_authenticated(&self) -> AuthResult<OAuthTokens> {
        match self.store.load().await {
            Some(tokens) => {
                self.set_state(AuthState::Authenticated);
                Ok(tokens)
            }
            None => self.authorize().await,
        }
    }

    /// Run the interactive authorization-code flow.
    ///
    /// Binds the callback listener, opens the browser, waits for the redirect,
    /// exchanges the code, picks a site and persists the resulting tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the callback is invalid or times out, if any
    /// endpoint call fails, or if no site is accessible.
    pub async fn authorize(&self) -> AuthResult<OAuthTokens> {
        let client_secret = self.client_secret()?.to_string();
        let listener = CallbackListener::bind(self.settings.callback_port).await?;
        let redirect_uri = format!("http://localhost:{}{CALLBACK_PATH}", listener.port());
        let nonce = generate_state();
        let auth_url = self.build_authorization_url(&redirect_uri, &nonce)?;

        self.set_state(AuthState::AwaitingCallback);
        tracing::info!("Atlassian authorization required. Open this URL in your browser:");
        tracing::info!("{auth_url}");

        if let Some(browser) = &self.browser {
            if let Err(e) = browser.open(&auth_url) {
                tracing::warn!("{e}. Open the URL above manually.");
            }
        }

        let result = self
            .complete_authorization(listener, &nonce, &redirect_uri, &client_secret)
            .await;

        match &result {
            Ok(tokens) => {
                self.set_state(AuthState::Authenticated);
                tracing::info!(site = %tokens.site_name, url = %tokens.site_url, "OAuth authorization complete");
            }
            Err(e) => {
                self.set_state(AuthState::Unauthenticated);
                tracing::warn!("OAuth authorization failed: {e}");
            }
        }
        result
    }

    async fn complete_authorization(
        &self,
        listener: CallbackListener,
        nonce: &str,
        redirect_uri: &str,
        client_secret: &str,
    ) -> AuthResult<OAuthTokens> {
        let code = listener.wait_for_code(nonce, self.auth_timeout).await?;

        self.set_state(AuthState::Exchanging);
        let response = self
            .request_tokens(&serde_json::json!({
                "grant_type": "authorization_code",
                "client_id": self.settings.client_id,
                "client_secret": client_secret,
                "code": code,
                "redirect_uri": redirect_uri,
            }))
            .await?;

        let refresh_token = response.refresh_token.ok_or_else(|| {
            OAuthError::InvalidResponse(
                "token response has no refresh_token (is offline_access granted?)".to_string(),
            )
        })?;

        let resources = self.accessible_resources(&response.access_token).await?;
        let site = select_site(&resources, self.settings.site_name.as_deref())
            .ok_or(OAuthError::NoAccessibleSites)?;

        let tokens = OAuthTokens {
            access_token: response.access_token,
            refresh_token,
            expires_at: expires_at(response.expires_in),
            cloud_id: site.id.clone(),
            site_name: site.name.clone(),
            site_url: site.url.clone(),
        };

        self.store.save(&tokens).await?;
        Ok(tokens)
    }

    /// Access token for the next request, refreshed first if it is due.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::NotAuthenticated`] if no tokens are stored, or
    /// any refresh error.
    pub async fn get_valid_access_token(&self) -> AuthResult<String> {
        let tokens = self
            .store
            .load()
            .await
            .ok_or(OAuthError::NotAuthenticated)?;

        if tokens.is_expired() {
            tracing::debug!("Access token due for refresh");
            return Ok(self.refresh_tokens().await?.access_token);
        }

        Ok(tokens.access_token)
    }

    /// Refresh the stored tokens.
    ///
    /// Concurrent callers share one in-flight refresh and all receive its result.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::RefreshTokenExpired`] (after deleting stored tokens)
    /// if the token endpoint answers 400, [`OAuthError::NotAuthenticated`] if no
    /// tokens are stored, or the underlying transport error.
    pub async fn refresh_tokens(&self) -> AuthResult<OAuthTokens> {
        let pending = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    tracing::debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let this = self.clone();
                    let pending = async move {
                        let _release = InFlightRelease(Arc::clone(&this.in_flight));
                        this.do_refresh().await
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    async fn do_refresh(&self) -> AuthResult<OAuthTokens> {
        let current = self
            .store
            .load()
            .await
            .ok_or(OAuthError::NotAuthenticated)?;
        let client_secret = self.client_secret()?;

        self.set_state(AuthState::Refreshing);
        let response = self
            .request_tokens(&serde_json::json!({
                "grant_type": "refresh_token",
                "client_id": self.settings.client_id,
                "client_secret": client_secret,
                "refresh_token": current.refresh_token,
            }))
            .await;

        let response = match response {
            Ok(response) => response,
            Err(OAuthError::TokenEndpoint { status: 400, message }) => {
                tracing::warn!("Refresh token rejected ({message}); removing stored tokens");
                if let Err(e) = self.store.delete().await {
                    tracing::error!("Could not remove rejected tokens: {e}");
                }
                self.set_state(AuthState::Unauthenticated);
                return Err(OAuthError::RefreshTokenExpired);
            }
            Err(e) => {
                self.set_state(AuthState::Authenticated);
                return Err(e);
            }
        };

        let tokens = OAuthTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token.unwrap_or(current.refresh_token),
            expires_at: expires_at(response.expires_in),
            cloud_id: current.cloud_id,
            site_name: current.site_name,
            site_url: current.site_url,
        };

        self.store.save(&tokens).await?;
        self.set_state(AuthState::Authenticated);
        tracing::debug!("OAuth tokens refreshed");
        Ok(tokens)
    }

    /// List the sites `access_token` can reach
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn accessible_resources(
        &self,
        access_token: &str,
    ) -> AuthResult<Vec<AccessibleResource>> {
        let response = self
            .http
            .get(self.endpoints.accessible_resources_url())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OAuthError::InvalidResponse(format!(
                "accessible-resources returned {status}: {}",
                truncate_for_display(&text, 200)
            )));
        }

        response.json().await.map_err(|e| {
            OAuthError::InvalidResponse(format!("Failed to parse accessible resources: {e}"))
        })
    }

    /// Delete stored tokens
    ///
    /// # Errors
    ///
    /// Returns an error if token deletion fails.
    pub async fn logout(&self) -> AuthResult<()> {
        self.store.delete().await?;
        self.set_state(AuthState::Unauthenticated);
        tracing::info!("Stored Atlassian OAuth tokens removed");
        Ok(())
    }

    /// Build the authorization URL for `redirect_uri` and `state`
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::NotConfigured`] if the authorization endpoint is not a valid URL.
    pub fn build_authorization_url(&self, redirect_uri: &str, state: &str) -> AuthResult<String> {
        let scope = DEFAULT_SCOPES.join(" ");
        let url = url::Url::parse_with_params(
            &self.endpoints.auth_url,
            &[
                ("audience", AUDIENCE),
                ("client_id", self.settings.client_id.as_str()),
                ("scope", scope.as_str()),
                ("redirect_uri", redirect_uri),
                ("state", state),
                ("response_type", "code"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| OAuthError::NotConfigured(format!("invalid authorization URL: {e}")))?;
        Ok(url.into())
    }

    fn client_secret(&self) -> AuthResult<&str> {
        self.settings.client_secret.as_deref().ok_or_else(|| {
            OAuthError::NotConfigured("ATLASSIAN_OAUTH_CLIENT_SECRET is not set".to_string())
        })
    }

    async fn request_tokens(&self, body: &serde_json::Value) -> AuthResult<TokenResponse> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .as_ref()
                .and_then(extract_error_message)
                .unwrap_or_else(|| truncate_for_display(&text, 200));
            return Err(OAuthError::TokenEndpoint {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            OAuthError::InvalidResponse(format!("Failed to parse token response: {e}"))
        })
    }
}

/// Pick the site to bind to.
///
/// A single site is used as is. With several, the first whose name equals the
/// hint or whose URL contains it wins; otherwise the first site is used and
/// the alternatives are logged.
#[must_use]
pub fn select_site<'a>(
    resources: &'a [AccessibleResource],
    hint: Option<&str>,
) -> Option<&'a AccessibleResource> {
    let first = resources.first()?;
    if resources.len() == 1 {
        return Some(first);
    }

    if let Some(hint) = hint {
        if let Some(matched) = resources
            .iter()
            .find(|r| r.name == hint || r.url.contains(hint))
        {
            return Some(matched);
        }
        tracing::warn!(
            "Site \"{hint}\" not found. Available: {}",
            resources
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    tracing::info!(
        "Multiple sites available: {}",
        resources
            .iter()
            .map(|r| format!("{} ({})", r.name, r.url))
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!(
        "Using \"{}\". Set ATLASSIAN_SITE_NAME to choose another.",
        first.name
    );
    Some(first)
}

/// Random 128-bit state nonce, hex encoded
fn generate_state() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn expires_at(expires_in_secs: u64) -> u64 {
    now_millis().saturating_add(expires_in_secs.saturating_mul(1000))
}
