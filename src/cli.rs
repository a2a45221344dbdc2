use clap::{Parser, Subcommand};

use crate::types::LogLevel;
use crate::youtube::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
#[command(
    name = "ytsub-transfer",
    version,
    about = "Copy YouTube subscriptions from one account to another, resuming across daily quota limits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// OAuth client secret downloaded from the Google Cloud console
    #[arg(long, env = "YTSUB_CLIENT_SECRET", default_value = "client_secret.json", global = true)]
    pub client_secret: String,

    /// Checkpoint database recording transfer progress
    #[arg(long, env = "YTSUB_CHECKPOINT", default_value = "transfer_state.db", global = true)]
    pub checkpoint: String,

    /// Directory holding cached OAuth tokens, one file per account role
    #[arg(
        long,
        env = "YTSUB_CREDENTIALS_DIR",
        default_value = "~/.credentials",
        global = true
    )]
    pub credentials_dir: String,

    /// YouTube Data API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL, global = true)]
    pub api_base_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Transfer subscriptions, resuming from the checkpoint (default)
    Run,

    /// Show checkpoint progress without contacting YouTube
    Status {
        /// List channels whose last attempt failed
        #[arg(long)]
        failed: bool,
    },
}

impl Cli {
    pub fn effective_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_runs_with_defaults() {
        let cli = Cli::try_parse_from(["ytsub-transfer"]).unwrap();
        assert!(matches!(cli.effective_command(), Command::Run));
        assert_eq!(cli.client_secret, "client_secret.json");
        assert_eq!(cli.checkpoint, "transfer_state.db");
        assert_eq!(cli.credentials_dir, "~/.credentials");
        assert_eq!(cli.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.no_progress_bar);
    }

    #[test]
    fn test_status_failed() {
        let cli = Cli::try_parse_from(["ytsub-transfer", "status", "--failed"]).unwrap();
        assert!(matches!(
            cli.effective_command(),
            Command::Status { failed: true }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ytsub-transfer",
            "status",
            "--checkpoint",
            "/tmp/other.db",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.checkpoint, "/tmp/other.db");
        assert_eq!(cli.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["ytsub-transfer", "--log-level", "trace"]).is_err());
    }
}
