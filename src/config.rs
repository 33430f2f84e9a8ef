//! Environment-derived configuration
//!
//! All settings come from environment variables. [`Config::from_lookup`] takes the
//! variable source as a closure so configuration can be built without touching
//! the process environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `JIRA_URL`, `JIRA_USERNAME`, `JIRA_API_TOKEN`, `JIRA_PERSONAL_TOKEN` | Jira site and static credentials | - |
//! | `CONFLUENCE_URL`, `CONFLUENCE_USERNAME`, `CONFLUENCE_API_TOKEN`, `CONFLUENCE_PERSONAL_TOKEN` | Confluence site and static credentials | - |
//! | `ATLASSIAN_OAUTH_CLIENT_ID`, `ATLASSIAN_OAUTH_CLIENT_SECRET` | Enables OAuth mode for both products | - |
//! | `OAUTH_CALLBACK_PORT` | Local callback listener port | `18080` |
//! | `ATLASSIAN_SITE_NAME` | Site name/URL hint when several sites are accessible | - |
//! | `HTTP_TIMEOUT` | Request timeout (ms) | `30000` |
//! | `HTTP_MAX_RETRIES` | Total attempts per request | `3` |
//! | `HTTP_RETRY_DELAY` | Base retry delay (ms) | `1000` |
//! | `LOG_LEVEL` | Fallback log filter when `RUST_LOG` is unset | `info` |

use crate::types::Product;
use std::time::Duration;
use thiserror::Error;
use typed_builder::TypedBuilder;

/// Default OAuth callback port
pub const DEFAULT_CALLBACK_PORT: u16 = 18080;
/// Default per-request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Default total attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base retry delay
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more settings are missing or inconsistent
    #[error("Configuration errors:\n{}", bullet_list(.0))]
    Invalid(Vec<String>),

    /// A numeric variable could not be parsed
    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },
}

fn bullet_list(problems: &[String]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Site URL and static credentials for one product
#[derive(Clone, Default)]
pub struct ProductConfig {
    /// Base URL, e.g. `https://example.atlassian.net`
    pub url: String,
    /// Account e-mail for Basic auth
    pub username: Option<String>,
    /// API token for Basic auth
    pub api_token: Option<String>,
    /// Personal Access Token (takes precedence over Basic auth)
    pub personal_token: Option<String>,
}

impl ProductConfig {
    /// Create a product config with only a base URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Whether any usable static credential is present
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.personal_token.is_some() || (self.username.is_some() && self.api_token.is_some())
    }
}

impl std::fmt::Debug for ProductConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field(
                "personal_token",
                &self.personal_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// OAuth 2.0 (3LO) application settings
#[derive(Clone)]
pub struct OAuthSettings {
    /// OAuth client ID from the Atlassian developer console
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Local port for the `/callback` listener
    pub callback_port: u16,
    /// Preferred site name or URL fragment
    pub site_name: Option<String>,
}

impl OAuthSettings {
    /// Settings with the default callback port and no site hint
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            callback_port: DEFAULT_CALLBACK_PORT,
            site_name: None,
        }
    }

    /// Redirect URI registered for this callback port
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.callback_port)
    }
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("callback_port", &self.callback_port)
            .field("site_name", &self.site_name)
            .finish()
    }
}

/// Transport settings shared by every product client
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for HttpConfig"),
    builder_type(doc = "Builder for HttpConfig", vis = "pub"),
    build_method(doc = "Build the HttpConfig")
)]
pub struct HttpConfig {
    /// Per-request timeout
    #[builder(default = DEFAULT_HTTP_TIMEOUT)]
    pub timeout: Duration,

    /// Total attempts per request (at least 1)
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Base retry delay, multiplied by the attempt number
    #[builder(default = DEFAULT_RETRY_DELAY)]
    pub retry_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Jira site, when configured
    pub jira: Option<ProductConfig>,
    /// Confluence site, when configured
    pub confluence: Option<ProductConfig>,
    /// OAuth application; when present OAuth mode applies to both products
    pub oauth: Option<OAuthSettings>,
    /// Transport settings
    pub http: HttpConfig,
    /// `LOG_LEVEL` value
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNumber`] if a numeric variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNumber`] if a numeric variable is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let product = |product: Product| {
            let prefix = product.env_prefix();
            get(&format!("{prefix}_URL")).map(|url| ProductConfig {
                url,
                username: get(&format!("{prefix}_USERNAME")),
                api_token: get(&format!("{prefix}_API_TOKEN")),
                personal_token: get(&format!("{prefix}_PERSONAL_TOKEN")),
            })
        };

        let oauth = match get("ATLASSIAN_OAUTH_CLIENT_ID") {
            Some(client_id) => Some(OAuthSettings {
                client_id,
                client_secret: get("ATLASSIAN_OAUTH_CLIENT_SECRET"),
                callback_port: parse_number(&get, "OAUTH_CALLBACK_PORT")?
                    .unwrap_or(DEFAULT_CALLBACK_PORT),
                site_name: get("ATLASSIAN_SITE_NAME"),
            }),
            None => None,
        };

        let http = HttpConfig {
            timeout: parse_number::<u64>(&get, "HTTP_TIMEOUT")?
                .map_or(DEFAULT_HTTP_TIMEOUT, Duration::from_millis),
            max_retries: parse_number::<u32>(&get, "HTTP_MAX_RETRIES")?
                .unwrap_or(DEFAULT_MAX_RETRIES)
                .max(1),
            retry_delay: parse_number::<u64>(&get, "HTTP_RETRY_DELAY")?
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis),
        };

        Ok(Self {
            jira: product(Product::Jira),
            confluence: product(Product::Confluence),
            oauth,
            http,
            log_level: get("LOG_LEVEL"),
        })
    }

    /// Site configuration for `product`
    #[must_use]
    pub fn product(&self, product: Product) -> Option<&ProductConfig> {
        match product {
            Product::Jira => self.jira.as_ref(),
            Product::Confluence => self.confluence.as_ref(),
        }
    }

    /// Whether OAuth mode is active
    #[must_use]
    pub fn is_oauth(&self) -> bool {
        self.oauth.is_some()
    }

    /// Check that the configuration can produce at least one working client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if let Some(oauth) = &self.oauth {
            if oauth.client_secret.is_none() {
                problems.push(
                    "OAuth: ATLASSIAN_OAUTH_CLIENT_SECRET must be provided with ATLASSIAN_OAUTH_CLIENT_ID"
                        .to_string(),
                );
            }
        } else {
            for product in Product::ALL {
                if let Some(cfg) = self.product(product) {
                    if !cfg.has_credentials() {
                        let prefix = product.env_prefix();
                        problems.push(format!(
                            "{}: Either {prefix}_PERSONAL_TOKEN or ({prefix}_USERNAME + {prefix}_API_TOKEN) must be provided",
                            product.display_name()
                        ));
                    }
                }
            }

            if self.jira.is_none() && self.confluence.is_none() {
                problems.push(
                    "At least one service (Jira or Confluence) must be configured".to_string(),
                );
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
