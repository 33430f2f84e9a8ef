//! OAuth token set and its on-disk store

use crate::utils::now_millis;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Tokens are refreshed this long before upstream expiry
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Errors that can occur while writing or deleting the token file
#[derive(Debug, Error)]
pub enum TokenError {
    /// I/O error during storage operations
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted OAuth token set bound to one Atlassian site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokens {
    /// Bearer token for API calls
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: String,
    /// Unix epoch milliseconds at which the access token expires
    pub expires_at: u64,
    /// Atlassian cloud ID of the selected site
    pub cloud_id: String,
    /// Display name of the selected site
    pub site_name: String,
    /// Base URL of the selected site
    pub site_url: String,
}

impl OAuthTokens {
    /// Whether the token is due for refresh (expired, or within the buffer)
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Expiry check against an explicit clock reading.
    ///
    /// `now >= expires_at - 5min`; the boundary itself counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        let buffer_ms = u64::try_from(TOKEN_REFRESH_BUFFER.as_millis()).unwrap_or(u64::MAX);
        now_ms >= self.expires_at.saturating_sub(buffer_ms)
    }

    /// Remaining lifetime of the access token, if it has not expired
    #[must_use]
    pub fn remaining_validity(&self) -> Option<Duration> {
        let now = now_millis();
        (self.expires_at > now).then(|| Duration::from_millis(self.expires_at - now))
    }

    /// `Authorization` header value
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// File-backed store for the single OAuth token set of this installation
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    /// Store at `~/.mcp-atlassian/tokens.json`
    #[must_use]
    pub fn new() -> Self {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mcp-atlassian");

        Self {
            path: dir.join("tokens.json"),
        }
    }

    /// Store at a custom path
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Token file location
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored tokens.
    ///
    /// A missing, unreadable or malformed file reads as `None`.
    pub async fn load(&self) -> Option<OAuthTokens> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %self.path.display(), "Could not read token file: {e}");
                }
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Ignoring malformed token file: {e}");
                None
            }
        }
    }

    /// Save tokens, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save(&self, tokens: &OAuthTokens) -> Result<(), TokenError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(tokens)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes()).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        // mode() only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms).await?;
        }

        Ok(())
    }

    /// Delete stored tokens. Succeeds if the file is already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn delete(&self) -> Result<(), TokenError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINUTE_MS: u64 = 60_000;

    fn sample_tokens(expires_at: u64) -> OAuthTokens {
        OAuthTokens {
            access_token: "access123".to_string(),
            refresh_token: "refresh456".to_string(),
            expires_at,
            cloud_id: "cloud-1".to_string(),
            site_name: "acme".to_string(),
            site_url: "https://acme.atlassian.net".to_string(),
        }
    }

    #[test]
    fn test_expiry_buffer() {
        let now = 1_700_000_000_000;
        assert!(sample_tokens(now + 4 * MINUTE_MS).is_expired_at(now));
        assert!(sample_tokens(now + 5 * MINUTE_MS).is_expired_at(now));
        assert!(!sample_tokens(now + 6 * MINUTE_MS).is_expired_at(now));
        assert!(sample_tokens(now - MINUTE_MS).is_expired_at(now));
    }

    #[test]
    fn test_expiry_against_wall_clock() {
        assert!(!sample_tokens(now_millis() + 60 * MINUTE_MS).is_expired());
        assert!(sample_tokens(0).is_expired());
    }

    #[test]
    fn test_remaining_validity() {
        assert!(sample_tokens(0).remaining_validity().is_none());
        let remaining = sample_tokens(now_millis() + 10 * MINUTE_MS)
            .remaining_validity()
            .unwrap();
        assert!(remaining > Duration::from_secs(9 * 60));
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(sample_tokens(0).authorization_header(), "Bearer access123");
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample_tokens(42)).unwrap();
        assert_eq!(json["accessToken"], "access123");
        assert_eq!(json["expiresAt"], 42);
        assert_eq!(json["cloudId"], "cloud-1");
        assert_eq!(json["siteUrl"], "https://acme.atlassian.net");
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = TokenStore::with_path(temp_dir.path().join("nested").join("tokens.json"));

        let tokens = sample_tokens(1_234_567);
        store.save(&tokens).await.unwrap();

        assert_eq!(store.load().await, Some(tokens));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = TokenStore::with_path(temp_dir.path().join("tokens.json"));

        let mut tokens = sample_tokens(1);
        tokens.access_token = "a-much-longer-access-token-than-the-next-one".to_string();
        store.save(&tokens).await.unwrap();

        let replacement = sample_tokens(2);
        store.save(&replacement).await.unwrap();
        assert_eq!(store.load().await, Some(replacement));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokens.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = TokenStore::with_path(&path);
        store.save(&sample_tokens(1)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = TokenStore::with_path(temp_dir.path().join("nonexistent.json"));
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_load_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokens.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = TokenStore::with_path(&path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = TokenStore::with_path(temp_dir.path().join("tokens.json"));

        store.delete().await.unwrap();

        store.save(&sample_tokens(1)).await.unwrap();
        store.delete().await.unwrap();
        assert!(store.load().await.is_none());
        store.delete().await.unwrap();
    }
}
