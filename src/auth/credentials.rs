//! Static credentials and per-request `Authorization` header resolution

use super::oauth::OAuthManager;
use crate::config::{Config, ProductConfig};
use crate::error::{AtlassianApiError, ErrorCode, Result};
use crate::types::Product;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::sync::Arc;

/// Static credential for one product
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Personal Access Token, sent as a bearer token
    PersonalToken(String),
    /// Account e-mail and API token, sent as HTTP Basic
    Basic {
        /// Account e-mail
        username: String,
        /// API token
        api_token: String,
    },
}

impl Credentials {
    /// Pick the credential configured for a product.
    ///
    /// A personal token wins over Basic auth when both are set.
    #[must_use]
    pub fn from_product_config(config: &ProductConfig) -> Option<Self> {
        if let Some(token) = &config.personal_token {
            return Some(Self::PersonalToken(token.clone()));
        }
        match (&config.username, &config.api_token) {
            (Some(username), Some(api_token)) => Some(Self::Basic {
                username: username.clone(),
                api_token: api_token.clone(),
            }),
            _ => None,
        }
    }

    /// `Authorization` header value
    #[must_use]
    pub fn authorization_header(&self) -> String {
        match self {
            Self::PersonalToken(token) => format!("Bearer {token}"),
            Self::Basic {
                username,
                api_token,
            } => format!("Basic {}", STANDARD.encode(format!("{username}:{api_token}"))),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PersonalToken(_) => f.write_str("PersonalToken(<redacted>)"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("api_token", &"<redacted>")
                .finish(),
        }
    }
}

/// Produces the `Authorization` header for each outgoing request
#[derive(Debug, Clone)]
pub enum CredentialResolver {
    /// Fixed credentials per configured product
    Static(HashMap<Product, Credentials>),
    /// Bearer tokens from the shared OAuth manager, refreshed on demand
    OAuth(Arc<OAuthManager>),
}

impl CredentialResolver {
    /// Build a static resolver for every product configured in `config`.
    ///
    /// # Errors
    ///
    /// Returns `AUTHENTICATION_FAILED` if a configured product has no usable
    /// credential.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut credentials = HashMap::new();

        for product in Product::ALL {
            let Some(product_config) = config.product(product) else {
                continue;
            };
            let creds = Credentials::from_product_config(product_config).ok_or_else(|| {
                let prefix = product.env_prefix();
                AtlassianApiError::authentication_failed(format!(
                    "{}: set {prefix}_PERSONAL_TOKEN or {prefix}_USERNAME and {prefix}_API_TOKEN",
                    product.display_name()
                ))
            })?;
            credentials.insert(product, creds);
        }

        Ok(Self::Static(credentials))
    }

    /// Resolver backed by an OAuth manager
    #[must_use]
    pub fn oauth(manager: Arc<OAuthManager>) -> Self {
        Self::OAuth(manager)
    }

    /// `Authorization` header for a request to `product`.
    ///
    /// In OAuth mode this may refresh the access token first.
    ///
    /// # Errors
    ///
    /// Returns `AUTHENTICATION_FAILED` if the product has no static credential
    /// or the OAuth token cannot be obtained.
    pub async fn resolve_auth_header(&self, product: Product) -> Result<String> {
        match self {
            Self::Static(credentials) => credentials
                .get(&product)
                .map(Credentials::authorization_header)
                .ok_or_else(|| {
                    AtlassianApiError::for_product(
                        product,
                        ErrorCode::AuthenticationFailed,
                        "no credentials configured",
                    )
                }),
            Self::OAuth(manager) => {
                let token = manager.get_valid_access_token().await.map_err(|e| {
                    AtlassianApiError::for_product(
                        product,
                        ErrorCode::AuthenticationFailed,
                        e.to_string(),
                    )
                })?;
                Ok(format!("Bearer {token}"))
            }
        }
    }

    /// Whether this resolver uses OAuth
    #[must_use]
    pub fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuth(_))
    }
}
