use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

pub const SOURCE_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";
pub const TARGET_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

/// One of the two accounts taking part in a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleConfig {
    /// Role name; also names the cached token file.
    pub name: String,
    /// OAuth scope the role needs.
    pub scope: String,
}

impl RoleConfig {
    /// The account being copied from, read-only.
    pub fn source() -> Self {
        Self {
            name: "source".to_string(),
            scope: SOURCE_SCOPE.to_string(),
        }
    }

    /// The account being copied to.
    pub fn target() -> Self {
        Self {
            name: "target".to_string(),
            scope: TARGET_SCOPE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Application configuration.
#[derive(Debug)]
pub struct Config {
    pub client_secret_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub credentials_dir: PathBuf,
    pub source: RoleConfig,
    pub target: RoleConfig,
    pub api: ApiConfig,
    pub no_progress_bar: bool,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        if cli.timeout == 0 {
            anyhow::bail!("--timeout must be greater than zero");
        }
        url::Url::parse(&cli.api_base_url)
            .with_context(|| format!("Invalid --api-base-url '{}'", cli.api_base_url))?;

        Ok(Self {
            client_secret_path: expand_tilde(&cli.client_secret),
            checkpoint_path: expand_tilde(&cli.checkpoint),
            credentials_dir: expand_tilde(&cli.credentials_dir),
            source: RoleConfig::source(),
            target: RoleConfig::target(),
            api: ApiConfig {
                base_url: cli.api_base_url.clone(),
                timeout: Duration::from_secs(cli.timeout),
            },
            no_progress_bar: cli.no_progress_bar,
        })
    }
}
