//! OAuth client secret as downloaded from the Google Cloud console.

use std::path::Path;

use serde::Deserialize;

use super::error::AuthError;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// The console wraps the credentials in an `installed` or `web` object.
#[derive(Deserialize)]
struct SecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ClientSecret {
    /// Parse the console JSON, preferring the `installed` block.
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let file: SecretFile = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        let secret = file
            .installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" object".to_string())?;
        if secret.client_id.trim().is_empty() {
            return Err("client_id is empty".to_string());
        }
        Ok(secret)
    }

    /// Read and parse the secrets file. Any failure here is fatal to the run.
    pub async fn load(path: &Path) -> Result<Self, AuthError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuthError::InvalidSecret {
                path: path.to_path_buf(),
                reason: format!("unable to read: {e}"),
            })?;
        Self::from_json(&contents).map_err(|reason| AuthError::InvalidSecret {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Redirect URI registered for the client; the first one wins.
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }
}
