//! OAuth credentials for the source and target accounts.
//!
//! Each role keeps its own cached token. Resolution order:
//! cached token with the right scope → refresh if expired → interactive
//! consent on the terminal.

pub mod error;
pub mod flow;
pub mod secrets;
pub mod token;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use self::error::AuthError;
pub use self::secrets::ClientSecret;
use self::token::CachedToken;
use crate::config::RoleConfig;
use crate::retry::RetryConfig;

/// An HTTP client bound to one account, handing out valid bearer tokens.
pub struct AuthorizedClient {
    role: String,
    scope: String,
    http: reqwest::Client,
    secret: Arc<ClientSecret>,
    token: tokio::sync::Mutex<CachedToken>,
    cache_path: PathBuf,
    retry: RetryConfig,
}

impl std::fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("role", &self.role)
            .field("cache_path", &self.cache_path)
            .finish_non_exhaustive()
    }
}

impl AuthorizedClient {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Current access token, refreshed and re-cached first if it expired.
    pub async fn bearer(&self) -> Result<String, AuthError> {
        let mut current = self.token.lock().await;
        if current.is_expired(Utc::now()) {
            let refresh_token = current.refresh_token.clone().ok_or_else(|| {
                AuthError::Denied(format!(
                    "access token for '{}' expired and no refresh token is cached",
                    self.role
                ))
            })?;
            tracing::debug!(role = %self.role, "Refreshing access token");
            let response =
                flow::refresh(&self.http, &self.secret, &refresh_token, &self.retry).await?;
            *current =
                CachedToken::from_response(response, Some(refresh_token), &self.scope, Utc::now());
            if let Err(e) = token::write_cached(&self.cache_path, &current).await {
                tracing::warn!(role = %self.role, "Failed to persist refreshed token: {}", e);
            }
        }
        Ok(current.access_token.clone())
    }
}

/// Resolve credentials for `role`, prompting on the terminal if needed.
pub async fn authorize(
    role: &RoleConfig,
    secret: Arc<ClientSecret>,
    credentials_dir: &Path,
    timeout: Duration,
) -> Result<AuthorizedClient, AuthError> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    let retry = RetryConfig::default();
    let cache_path = token::cache_path(credentials_dir, &role.name);

    let token = match token::read_cached(&cache_path).await {
        Some(cached) if !cached.covers_scope(&role.scope) => {
            tracing::info!(
                role = %role.name,
                "Cached credential was granted a different scope, re-authorizing"
            );
            interactive(role, &secret, &http, &retry, &cache_path).await?
        }
        Some(cached) if cached.is_expired(Utc::now()) => {
            match refresh_cached(role, &secret, &http, &retry, &cache_path, cached).await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(role = %role.name, "Token refresh failed: {}", e);
                    interactive(role, &secret, &http, &retry, &cache_path).await?
                }
            }
        }
        Some(cached) => {
            tracing::debug!(role = %role.name, "Using cached credential");
            cached
        }
        None => interactive(role, &secret, &http, &retry, &cache_path).await?,
    };

    tracing::info!(role = %role.name, "Account authorized");
    Ok(AuthorizedClient {
        role: role.name.clone(),
        scope: role.scope.clone(),
        http,
        secret,
        token: tokio::sync::Mutex::new(token),
        cache_path,
        retry,
    })
}

async fn refresh_cached(
    role: &RoleConfig,
    secret: &ClientSecret,
    http: &reqwest::Client,
    retry: &RetryConfig,
    cache_path: &Path,
    cached: CachedToken,
) -> Result<CachedToken, AuthError> {
    let refresh_token = cached
        .refresh_token
        .ok_or_else(|| AuthError::Denied("no refresh token cached".into()))?;
    let response = flow::refresh(http, secret, &refresh_token, retry).await?;
    let token = CachedToken::from_response(response, Some(refresh_token), &role.scope, Utc::now());
    token::write_cached(cache_path, &token).await?;
    Ok(token)
}

async fn interactive(
    role: &RoleConfig,
    secret: &ClientSecret,
    http: &reqwest::Client,
    retry: &RetryConfig,
    cache_path: &Path,
) -> Result<CachedToken, AuthError> {
    if !std::io::stdin().is_terminal() {
        return Err(AuthError::InteractionRequired {
            role: role.name.clone(),
        });
    }

    let state = flow::new_state();
    let consent = flow::consent_url(secret, &role.scope, &state)?;
    let input = flow::prompt_for_code(&role.name, &consent).await?;
    let code = flow::extract_code(&input, &state)?;

    let response = flow::exchange_code(http, secret, &code, retry).await?;
    if response.refresh_token.is_none() {
        tracing::warn!(
            role = %role.name,
            "Token endpoint returned no refresh token; authorization will be needed again after expiry"
        );
    }
    let token = CachedToken::from_response(response, None, &role.scope, Utc::now());
    token::write_cached(cache_path, &token).await?;
    tracing::info!(role = %role.name, "Saved credential to {}", cache_path.display());
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ytsub_transfer_tests")
            .join("auth")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn secret() -> Arc<ClientSecret> {
        Arc::new(
            ClientSecret::from_json(r#"{"installed": {"client_id": "id", "client_secret": "s"}}"#)
                .unwrap(),
        )
    }

    fn role(scope: &str) -> RoleConfig {
        RoleConfig {
            name: "source".into(),
            scope: scope.into(),
        }
    }

    fn fresh_token(scope: Option<&str>) -> CachedToken {
        CachedToken {
            access_token: "ya29.cached".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("1//refresh".into()),
            expiry: Some(Utc::now() + chrono::Duration::hours(1)),
            scope: scope.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_valid_cached_token_used_without_prompt() {
        let dir = test_dir("cached");
        let path = token::cache_path(&dir, "source");
        token::write_cached(&path, &fresh_token(Some("scope-r")))
            .await
            .unwrap();

        let client = authorize(&role("scope-r"), secret(), &dir, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(client.role(), "source");
        assert_eq!(client.bearer().await.unwrap(), "ya29.cached");
    }

    #[tokio::test]
    async fn test_scope_mismatch_needs_interaction_without_terminal() {
        if std::io::stdin().is_terminal() {
            return;
        }
        let dir = test_dir("scope_mismatch");
        let path = token::cache_path(&dir, "source");
        token::write_cached(&path, &fresh_token(Some("scope-r")))
            .await
            .unwrap();

        let err = authorize(&role("scope-w"), secret(), &dir, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InteractionRequired { .. }));
    }

    #[tokio::test]
    async fn test_missing_cache_needs_interaction_without_terminal() {
        if std::io::stdin().is_terminal() {
            return;
        }
        let dir = test_dir("missing");
        let err = authorize(&role("scope-r"), secret(), &dir, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InteractionRequired { ref role } if role == "source"));
    }
}
