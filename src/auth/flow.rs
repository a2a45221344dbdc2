//! Installed-application authorization on the terminal.
//!
//! The consent URL is printed, the user approves access in a browser and
//! pastes back either the bare authorization code or the whole redirect URL
//! the browser landed on.

use std::io::{self, Write};

use rand::distributions::Alphanumeric;
use rand::Rng as _;
use serde::Deserialize;
use url::Url;

use super::error::AuthError;
use super::secrets::ClientSecret;
use super::token::TokenResponse;
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};

const STATE_LENGTH: usize = 24;

/// Google's token endpoint error body.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Random value tying the consent redirect to this process.
pub fn new_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Consent page URL requesting offline access so a refresh token is issued.
pub fn consent_url(secret: &ClientSecret, scope: &str, state: &str) -> Result<Url, AuthError> {
    Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", secret.redirect_uri()),
            ("response_type", "code"),
            ("scope", scope),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| AuthError::Denied(format!("invalid auth_uri '{}': {e}", secret.auth_uri)))
}

/// Pull the authorization code out of what the user pasted.
///
/// A bare code is accepted as-is. A redirect URL must carry a matching
/// `state` and either a `code` or an `error` parameter.
pub fn extract_code(input: &str, expected_state: &str) -> Result<String, AuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::Denied("no authorization code entered".into()));
    }

    if !(input.starts_with("http://") || input.starts_with("https://")) {
        return Ok(input.to_string());
    }
    let url = Url::parse(input)
        .map_err(|e| AuthError::Denied(format!("unable to parse redirect URL: {e}")))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(AuthError::Denied(error));
    }
    if let Some(state) = &state {
        if state != expected_state {
            return Err(AuthError::Denied(
                "state parameter does not match this authorization request".into(),
            ));
        }
    }
    code.ok_or_else(|| AuthError::Denied("redirect URL carries no code parameter".into()))
}

/// Print the consent URL and block on stdin for the response.
pub async fn prompt_for_code(role: &str, consent: &Url) -> Result<String, AuthError> {
    let role = role.to_string();
    let consent = consent.to_string();
    let input = tokio::task::spawn_blocking(move || {
        println!();
        println!("Authorize the '{role}' account by visiting this URL:");
        println!();
        println!("  {consent}");
        println!();
        print!("Paste the authorization code or the full redirect URL: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok::<String, io::Error>(line)
    })
    .await
    .map_err(io::Error::other)??;
    Ok(input)
}

fn classify(e: &AuthError) -> RetryAction {
    if e.is_transient() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

async fn post_token(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let response = http.post(token_uri).form(form).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(err) => match err.error_description {
                Some(desc) => format!("{}: {}", err.error, desc),
                None => err.error,
            },
            Err(_) => body,
        };
        return Err(AuthError::TokenEndpoint {
            code: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Trade an authorization code for tokens.
pub async fn exchange_code(
    http: &reqwest::Client,
    secret: &ClientSecret,
    code: &str,
    retry: &RetryConfig,
) -> Result<TokenResponse, AuthError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", secret.client_id.as_str()),
        ("client_secret", secret.client_secret.as_str()),
        ("redirect_uri", secret.redirect_uri()),
    ];
    retry_with_backoff(retry, classify, || {
        post_token(http, &secret.token_uri, &form)
    })
    .await
}

/// Obtain a fresh access token from a refresh token.
pub async fn refresh(
    http: &reqwest::Client,
    secret: &ClientSecret,
    refresh_token: &str,
    retry: &RetryConfig,
) -> Result<TokenResponse, AuthError> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", secret.client_id.as_str()),
        ("client_secret", secret.client_secret.as_str()),
    ];
    retry_with_backoff(retry, classify, || {
        post_token(http, &secret.token_uri, &form)
    })
    .await
}
