use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while obtaining or refreshing account credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid client secret file {path}: {reason}")]
    InvalidSecret { path: PathBuf, reason: String },

    #[error(
        "Authorization for the '{role}' account needs an interactive terminal.\n\
         Run ytsub-transfer once from a terminal to cache credentials."
    )]
    InteractionRequired { role: String },

    #[error("Authorization was not completed: {0}")]
    Denied(String),

    #[error("Token endpoint error (HTTP {code}): {message}")]
    TokenEndpoint { code: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Whether a token request failing this way is worth repeating.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::TokenEndpoint { code, .. } => *code == 429 || *code >= 500,
            AuthError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
