//! ytsub-transfer: copy YouTube subscriptions from one account to another.
//!
//! The YouTube Data API allows only a few hundred subscription inserts per
//! day, so a large list takes several runs. Progress is kept in a SQLite
//! checkpoint; each invocation picks up at the first channel not yet
//! imported and stops cleanly when the daily quota runs out.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
pub mod retry;
mod shutdown;
mod state;
mod transfer;
mod types;
mod youtube;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::Config;
use state::SqliteCheckpointStore;
use transfer::{ApplyOptions, PlanOrigin, RunOutcome, RunReport};
use youtube::YouTubeClient;

/// Run the status command.
async fn run_status(config: &Config, failed: bool) -> anyhow::Result<()> {
    let store = SqliteCheckpointStore::new(&config.checkpoint_path);
    if !store.exists() {
        println!("No checkpoint found at {}", config.checkpoint_path.display());
        println!("Run a transfer first to create it.");
        return Ok(());
    }

    let summary = store.summary().await?;

    println!("Checkpoint: {}", config.checkpoint_path.display());
    println!();
    println!("Channels:");
    println!("  Total:     {}", summary.total);
    println!("  Imported:  {}", summary.imported);
    println!("  Pending:   {}", summary.pending);
    println!("  Failing:   {}", summary.with_errors);
    println!();
    println!("Runs: {}", summary.runs);
    if let Some(started) = &summary.last_run_started {
        println!(
            "Last run started:    {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_run_completed {
        println!(
            "Last run completed:  {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if summary.last_run_halted_on_quota {
        println!("Last run stopped on the daily quota; run again after it resets.");
    }

    if failed && summary.with_errors > 0 {
        println!();
        println!("Failing channels:");
        for item in store.failed_items().await? {
            println!(
                "  {} ({}) - {} attempt(s): {}",
                item.channel.title,
                item.id(),
                item.attempts,
                item.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Authorize both accounts, build the plan and apply it.
async fn run_transfer(config: &Config) -> anyhow::Result<()> {
    let secret = Arc::new(
        auth::ClientSecret::load(&config.client_secret_path)
            .await
            .context("Unable to load client secret")?,
    );
    let store = SqliteCheckpointStore::new(&config.checkpoint_path);
    tracing::info!("Checkpoint at {}", store.path().display());

    let source_auth = auth::authorize(
        &config.source,
        Arc::clone(&secret),
        &config.credentials_dir,
        config.api.timeout,
    )
    .await
    .context("Unable to authorize the source account")?;
    let target_auth = auth::authorize(
        &config.target,
        Arc::clone(&secret),
        &config.credentials_dir,
        config.api.timeout,
    )
    .await
    .context("Unable to authorize the target account")?;

    let source = YouTubeClient::new(Arc::new(source_auth), &config.api.base_url)?;
    let target = YouTubeClient::new(Arc::new(target_auth), &config.api.base_url)?;

    let plan = transfer::plan::build_plan(&store, &source).await?;
    let mut state = plan.state;
    if state.is_empty() {
        tracing::info!("The source account has no subscriptions, nothing to do");
        return Ok(());
    }
    if plan.origin == PlanOrigin::Resumed && state.is_complete() {
        tracing::info!(
            "All {} channels already imported, nothing to do",
            state.len()
        );
        return Ok(());
    }

    let options = ApplyOptions {
        no_progress_bar: config.no_progress_bar,
    };
    // Until here Ctrl+C keeps its default meaning, so it can abort the
    // consent prompt or a long enumeration.
    let shutdown_token = shutdown::install_signal_handler();
    let report = transfer::apply::run(&mut state, &target, &store, &options, &shutdown_token).await;
    log_report(&report);
    Ok(())
}

fn log_report(report: &RunReport) {
    let stats = &report.stats;
    tracing::info!("── Transfer Summary ──");
    tracing::info!("  {} subscribed", stats.imported);
    if stats.reconciled > 0 {
        tracing::info!("  {} already present on the target account", stats.reconciled);
    }
    if stats.deferred > 0 {
        tracing::info!("  {} failed (will retry next run)", stats.deferred);
    }
    tracing::info!(
        "  {} of {} channels still pending",
        report.remaining,
        report.total
    );
    match report.outcome {
        RunOutcome::Completed if report.remaining == 0 => {
            tracing::info!("Transfer complete");
        }
        RunOutcome::Completed => {
            tracing::info!("Run finished; failed channels are retried on the next run");
        }
        RunOutcome::HaltedOnQuota => {
            tracing::warn!("Stopped on the daily quota; run again after it resets to continue");
        }
        RunOutcome::Interrupted => {
            tracing::info!("Interrupted; run again to continue");
        }
    }
    if !report.checkpoint_saved {
        tracing::error!(
            "Progress from this run could not be fully saved; \
             channels imported this run may be attempted again"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = Config::from_cli(&cli)?;
    match cli.effective_command() {
        Command::Status { failed } => run_status(&config, failed).await,
        Command::Run => {
            tracing::info!("Starting ytsub-transfer");
            run_transfer(&config).await
        }
    }
}
