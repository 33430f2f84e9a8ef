//! Error types for the Atlassian bridge
//!
//! Every failure surfaced by the gateway is an [`AtlassianApiError`] tagged with an
//! [`ErrorCode`]. Transport-level outcomes are first normalized into a
//! [`TransportFailure`] so classification never depends on the shape of a
//! particular HTTP client's error type.

use crate::auth::OAuthError;
use crate::config::ConfigError;
use crate::types::Product;
use crate::utils::{extract_error_message, truncate_for_display};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Classified error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Credentials missing or rejected before a request could be made
    AuthenticationFailed,
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    Forbidden,

    /// Request sent but no response received
    NetworkError,
    /// Transport timeout
    Timeout,
    /// Upstream refused the connection
    ConnectionRefused,

    /// HTTP 400
    BadRequest,
    /// HTTP 404
    NotFound,
    /// HTTP 429
    RateLimitExceeded,
    /// HTTP 500
    ServerError,
    /// HTTP 503
    ServiceUnavailable,

    /// No client registered for the requested product
    ClientNotConfigured,
    /// Local configuration is unusable
    InvalidConfiguration,

    /// Anything else
    UnknownError,
}

impl ErrorCode {
    /// Map an HTTP status to its error code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorCode::BadRequest,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            429 => ErrorCode::RateLimitExceeded,
            500 => ErrorCode::ServerError,
            503 => ErrorCode::ServiceUnavailable,
            _ => ErrorCode::UnknownError,
        }
    }

    /// Wire name, e.g. `RATE_LIMIT_EXCEEDED`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::ClientNotConfigured => "CLIENT_NOT_CONFIGURED",
            ErrorCode::InvalidConfiguration => "INVALID_CONFIGURATION",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Codes that describe a transient condition
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::Timeout
                | ErrorCode::ConnectionRefused
                | ErrorCode::RateLimitExceeded
                | ErrorCode::ServerError
                | ErrorCode::ServiceUnavailable
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Error raised by the gateway and the credential layer
#[derive(Debug, Clone, Error)]
#[error("{message} [{code}]{}", http_suffix(.status))]
pub struct AtlassianApiError {
    /// Classified error code
    pub code: ErrorCode,
    /// Human-readable message, prefixed with the product name when known
    pub message: String,
    /// HTTP status, when the upstream answered
    pub status: Option<u16>,
    /// Decoded upstream response body, when one was returned
    pub response_body: Option<serde_json::Value>,
    /// Server-requested delay from a `retry-after` header
    pub retry_after: Option<Duration>,
    /// Product the failing request targeted
    pub product: Option<Product>,
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, AtlassianApiError>;

impl AtlassianApiError {
    /// Create an error with a code and message only
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            response_body: None,
            retry_after: None,
            product: None,
        }
    }

    /// Create a product-scoped error; the message gets the product prefix
    pub fn for_product(product: Product, code: ErrorCode, message: impl AsRef<str>) -> Self {
        Self {
            product: Some(product),
            ..Self::new(
                code,
                format!("{}: {}", product.display_name(), message.as_ref()),
            )
        }
    }

    /// Error for a product with no registered client
    #[must_use]
    pub fn client_not_configured(product: Product) -> Self {
        Self::for_product(
            product,
            ErrorCode::ClientNotConfigured,
            format!(
                "{product} client not configured. Set {}_URL and its credentials.",
                product.env_prefix()
            ),
        )
    }

    /// Error for unusable local configuration
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Error for missing or rejected credentials
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationFailed, message)
    }

    /// Classify a normalized transport outcome for `product`
    #[must_use]
    pub fn from_transport(failure: TransportFailure, product: Product) -> Self {
        match failure {
            TransportFailure::Status {
                status,
                body,
                retry_after,
            } => {
                let message = body
                    .as_ref()
                    .and_then(extract_error_message)
                    .map(|m| truncate_for_display(&m, 500))
                    .unwrap_or_else(|| format!("API Error ({status})"));
                let mut err = Self::for_product(product, ErrorCode::from_status(status), message);
                err.status = Some(status);
                err.response_body = body;
                err.retry_after = retry_after;
                err
            }
            TransportFailure::TimedOut(_) => {
                Self::for_product(product, ErrorCode::Timeout, "Request timeout")
            }
            TransportFailure::ConnectionRefused(_) => {
                Self::for_product(product, ErrorCode::ConnectionRefused, "Connection refused")
            }
            TransportFailure::Network(detail) => Self::for_product(
                product,
                ErrorCode::NetworkError,
                format!("Network error - {detail}"),
            ),
            TransportFailure::Other(detail) => {
                Self::for_product(product, ErrorCode::UnknownError, detail)
            }
        }
    }

    /// Whether a retry may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_transient() || self.status.is_some_and(|s| s >= 500)
    }

    /// Classified code
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// HTTP status, when present
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl From<OAuthError> for AtlassianApiError {
    fn from(err: OAuthError) -> Self {
        Self::authentication_failed(err.to_string())
    }
}

impl From<ConfigError> for AtlassianApiError {
    fn from(err: ConfigError) -> Self {
        Self::invalid_configuration(err.to_string())
    }
}

/// Normalized outcome of a failed HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFailure {
    /// The upstream answered with a non-success status
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (JSON, or the raw text as a JSON string)
        body: Option<serde_json::Value>,
        /// Parsed `retry-after` header
        retry_after: Option<Duration>,
    },
    /// Connection was actively refused
    ConnectionRefused(String),
    /// Connect or read timed out
    TimedOut(String),
    /// Request left but no response came back
    Network(String),
    /// Request could not be built or sent
    Other(String),
}

impl TransportFailure {
    /// Normalize a `reqwest` error that carries no response
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportFailure::TimedOut(err.to_string());
        }
        if err.is_connect() {
            if is_connection_refused(err) {
                return TransportFailure::ConnectionRefused(err.to_string());
            }
            return TransportFailure::Network(err.to_string());
        }
        if err.is_request() || err.is_body() || err.is_decode() {
            return TransportFailure::Network(err.to_string());
        }
        TransportFailure::Other(err.to_string())
    }
}

fn is_connection_refused(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = current.source();
    }
    false
}
