use thiserror::Error;

use crate::auth::error::AuthError;

/// Coarse classification the transfer loop acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The destination already subscribes to the channel.
    Duplicate,
    /// Daily quota spent; nothing more will succeed today.
    QuotaExceeded,
    Other,
}

const DUPLICATE_REASONS: &[&str] = &["subscriptionDuplicate"];
const QUOTA_REASONS: &[&str] = &["quotaExceeded", "dailyLimitExceeded"];

/// Google API error envelope: `{"error": {"code", "message", "errors": [{"reason"}]}}`.
#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("YouTube API error (HTTP {status}, reason {reason}): {message}")]
    Remote {
        kind: ApiErrorKind,
        status: u16,
        reason: String,
        message: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Credential error: {0}")]
    Auth(#[from] AuthError),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Pagination error: {0}")]
    Pagination(String),
}

impl ApiError {
    /// Decode a non-2xx response into a classified error.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                let reasons: Vec<&str> = envelope
                    .error
                    .errors
                    .iter()
                    .map(|d| d.reason.as_str())
                    .collect();
                let kind = classify_reasons(&reasons);
                let reason = reasons
                    .iter()
                    .copied()
                    .find(|r| !r.is_empty())
                    .unwrap_or("unknown")
                    .to_string();
                Self::Remote {
                    kind,
                    status,
                    reason,
                    message: envelope.error.message,
                }
            }
            Err(_) => Self::Remote {
                kind: ApiErrorKind::Other,
                status,
                reason: "unknown".to_string(),
                message: body.trim().chars().take(200).collect(),
            },
        }
    }

    #[cfg(test)]
    pub fn remote(kind: ApiErrorKind, status: u16, reason: &str, message: &str) -> Self {
        Self::Remote {
            kind,
            status,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Remote { kind, .. } => *kind,
            _ => ApiErrorKind::Other,
        }
    }
}

fn classify_reasons(reasons: &[&str]) -> ApiErrorKind {
    if reasons.iter().any(|r| QUOTA_REASONS.contains(r)) {
        ApiErrorKind::QuotaExceeded
    } else if reasons.iter().any(|r| DUPLICATE_REASONS.contains(r)) {
        ApiErrorKind::Duplicate
    } else {
        ApiErrorKind::Other
    }
}
