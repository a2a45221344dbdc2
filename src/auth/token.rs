//! Per-role token cache on disk.
//!
//! Tokens are stored as JSON, one file per role name, in the same shape the
//! Go oauth2 package writes (`access_token`, `token_type`, `refresh_token`,
//! `expiry`) plus the granted `scope`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::error::AuthError;

/// Refresh this long before the recorded expiry.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

impl CachedToken {
    /// Build a cache entry from a token response.
    ///
    /// Refresh responses usually omit `refresh_token`; the previous one is
    /// carried over so the next refresh still works.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        requested_scope: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(default_token_type),
            refresh_token: response.refresh_token.or(previous_refresh),
            expiry: response
                .expires_in
                .map(|secs| now + Duration::seconds(secs)),
            scope: response
                .scope
                .or_else(|| Some(requested_scope.to_string())),
        }
    }

    /// Whether the access token must be refreshed before use.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_LEEWAY_SECS) <= now,
            None => false,
        }
    }

    /// Whether the token was granted `scope`. Tokens cached without a scope
    /// record are trusted as-is.
    pub fn covers_scope(&self, scope: &str) -> bool {
        match &self.scope {
            Some(granted) => granted.split_whitespace().any(|s| s == scope),
            None => true,
        }
    }
}

/// Cache file for a role: `<dir>/<url-escaped "role.json">`.
pub fn cache_path(credentials_dir: &Path, role: &str) -> PathBuf {
    credentials_dir.join(urlencoding::encode(&format!("{role}.json")).into_owned())
}

/// Read a cached token. Missing or unreadable caches yield `None` so the
/// caller falls back to a fresh authorization.
pub async fn read_cached(path: &Path) -> Option<CachedToken> {
    let contents = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No cached credential at {}", path.display());
            return None;
        }
        Err(e) => {
            tracing::warn!("Failed to read cached credential {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::info!(
                "Cached credential {} is corrupt, re-authorizing: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// Persist a token, readable by the owner only.
pub async fn write_cached(path: &Path, token: &CachedToken) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(parent, perms)?;
        }
    }
    let json = serde_json::to_string_pretty(token)?;
    fs::write(path, json).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    tracing::debug!("Saved credential to {}", path.display());
    Ok(())
}
