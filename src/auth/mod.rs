//! Authentication for Jira and Confluence
//!
//! Two modes are supported and chosen once at startup:
//!
//! - **Static**: a Personal Access Token (`Bearer`) or e-mail plus API token
//!   (`Basic`) per product, see [`Credentials`].
//! - **OAuth 2.0 (3LO)**: one token set shared by both products, obtained through
//!   a browser authorization-code flow and refreshed automatically, see
//!   [`OAuthManager`].
//!
//! [`CredentialResolver`] hides the difference from the HTTP gateway.
//!
//! # Example
//!
//! ```no_run
//! use atlassian_mcp_bridge::auth::{OAuthManager, TokenStore};
//! use atlassian_mcp_bridge::config::OAuthSettings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = OAuthManager::builder(OAuthSettings::new("client-id", "client-secret"))
//!         .store(TokenStore::new())
//!         .build();
//!
//!     // Uses stored tokens when present, otherwise opens the browser
//!     let tokens = manager.ensure_authenticated().await?;
//!     println!("Bound to {} ({})", tokens.site_name, tokens.site_url);
//!
//!     let access_token = manager.get_valid_access_token().await?;
//!     # let _ = access_token;
//!     Ok(())
//! }
//! ```
//!
//! # Token Storage
//!
//! Tokens live in `~/.mcp-atlassian/tokens.json`, written with user-only
//! permissions (600). The location can be changed via [`TokenStore::with_path`].
//!
//! # Refresh
//!
//! Access tokens are refreshed 5 minutes before expiry. Concurrent callers share a
//! single refresh request. If the refresh token itself is rejected, the stored
//! tokens are deleted and [`OAuthError::RefreshTokenExpired`] is returned.

mod callback;
mod credentials;
mod oauth;
mod token;

pub use callback::{CALLBACK_PATH, CallbackListener};
pub use credentials::{CredentialResolver, Credentials};
pub use oauth::{
    AUTH_TIMEOUT, AccessibleResource, AuthResult, AuthState, BrowserLauncher, DEFAULT_SCOPES,
    OAuthEndpoints, OAuthError, OAuthManager, OAuthManagerBuilder, SystemBrowser, select_site,
};
pub use token::{OAuthTokens, TOKEN_REFRESH_BUFFER, TokenError, TokenStore};
