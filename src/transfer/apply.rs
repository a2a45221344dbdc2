//! Sequential apply loop over the transfer plan.

use tokio_util::sync::CancellationToken;

use super::progress::create_progress_bar;
use crate::state::{CheckpointStore, TransferRunStats, TransferState};
use crate::youtube::{ApiError, ApiErrorKind, SubscriptionSink};

/// What happened to a single plan item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// The checkpoint already had it; no request sent.
    AlreadyImported,
    Imported,
    /// The destination already subscribed; counted as imported.
    Reconciled,
    /// Failed for a reason other than quota; stays pending for the next run.
    Deferred(ApiError),
    /// Quota spent; stays pending and the run stops here.
    QuotaExhausted(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Halt,
}

impl ItemOutcome {
    pub fn control(&self) -> LoopControl {
        match self {
            ItemOutcome::QuotaExhausted(_) => LoopControl::Halt,
            _ => LoopControl::Continue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item was visited. Deferred items may still be pending.
    Completed,
    HaltedOnQuota,
    /// Stopped between items by a shutdown signal.
    Interrupted,
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: TransferRunStats,
    /// Whether the final checkpoint write succeeded.
    pub checkpoint_saved: bool,
    pub remaining: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub no_progress_bar: bool,
}

/// Attempt one plan item against the destination and update `state`.
pub async fn apply_item(
    state: &mut TransferState,
    index: usize,
    sink: &dyn SubscriptionSink,
) -> ItemOutcome {
    let Some(item) = state.items().get(index) else {
        return ItemOutcome::AlreadyImported;
    };
    if item.is_imported() {
        return ItemOutcome::AlreadyImported;
    }
    let channel = item.channel.clone();

    match sink.insert(&channel).await {
        Ok(()) => {
            state.mark_imported(index);
            ItemOutcome::Imported
        }
        Err(e) => match e.kind() {
            ApiErrorKind::Duplicate => {
                state.mark_imported(index);
                ItemOutcome::Reconciled
            }
            ApiErrorKind::QuotaExceeded => ItemOutcome::QuotaExhausted(e),
            ApiErrorKind::Other => {
                state.record_failure(index, &e.to_string());
                ItemOutcome::Deferred(e)
            }
        },
    }
}

/// Walk the plan in order until it is exhausted, the quota runs out, or
/// shutdown is requested. The final state is always written back to `store`.
///
/// Checkpoint write failures are logged and never abort the run; the
/// in-memory state stays authoritative until the process exits.
pub async fn run(
    state: &mut TransferState,
    sink: &dyn SubscriptionSink,
    store: &dyn CheckpointStore,
    options: &ApplyOptions,
    shutdown_token: &CancellationToken,
) -> RunReport {
    let total = state.len();
    let mut stats = TransferRunStats::default();

    let run_id = match store.start_run().await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!("Failed to record run start: {}", e);
            None
        }
    };

    let pb = create_progress_bar(options.no_progress_bar, total as u64);
    pb.set_position(state.imported_count() as u64);

    for index in 0..total {
        if shutdown_token.is_cancelled() {
            pb.suspend(|| tracing::info!("Shutdown requested, stopping before the next channel"));
            stats.interrupted = true;
            break;
        }

        let (channel_id, title) = {
            let item = &state.items()[index];
            (item.id().to_string(), item.channel.title.clone())
        };
        pb.set_message(title.clone());

        let outcome = apply_item(state, index, sink).await;
        let control = outcome.control();
        match outcome {
            ItemOutcome::AlreadyImported => {
                tracing::debug!(channel_id = %channel_id, "Already imported, skipping");
                stats.skipped += 1;
                continue;
            }
            ItemOutcome::Imported => {
                stats.attempted += 1;
                stats.imported += 1;
                pb.suspend(|| {
                    tracing::info!(channel_id = %channel_id, "Subscribed to {}", title)
                });
                flush_imported(store, &channel_id, &pb).await;
            }
            ItemOutcome::Reconciled => {
                stats.attempted += 1;
                stats.reconciled += 1;
                pb.suspend(|| {
                    tracing::info!(
                        channel_id = %channel_id,
                        "Already subscribed to {} on the target account",
                        title
                    )
                });
                flush_imported(store, &channel_id, &pb).await;
            }
            ItemOutcome::Deferred(e) => {
                stats.attempted += 1;
                stats.deferred += 1;
                pb.suspend(|| {
                    tracing::error!(channel_id = %channel_id, "Failed to subscribe to {}: {}", title, e)
                });
                if let Err(se) = store.record_failure(&channel_id, &e.to_string()).await {
                    pb.suspend(|| {
                        tracing::warn!(channel_id = %channel_id, "Failed to record failure: {}", se)
                    });
                }
            }
            ItemOutcome::QuotaExhausted(e) => {
                stats.attempted += 1;
                stats.halted_on_quota = true;
                pb.suspend(|| {
                    tracing::warn!(
                        channel_id = %channel_id,
                        "Daily quota exhausted, stopping until the quota resets: {}",
                        e
                    )
                });
            }
        }

        if control == LoopControl::Halt {
            break;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let checkpoint_saved = match store.save(state).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Failed to save checkpoint: {}", e);
            false
        }
    };

    if let Some(run_id) = run_id {
        if let Err(e) = store.complete_run(run_id, &stats).await {
            tracing::warn!("Failed to record run completion: {}", e);
        }
    }

    let outcome = if stats.halted_on_quota {
        RunOutcome::HaltedOnQuota
    } else if stats.interrupted {
        RunOutcome::Interrupted
    } else {
        RunOutcome::Completed
    };

    RunReport {
        outcome,
        stats,
        checkpoint_saved,
        remaining: state.pending_count(),
        total,
    }
}

async fn flush_imported(
    store: &dyn CheckpointStore,
    channel_id: &str,
    pb: &indicatif::ProgressBar,
) {
    if let Err(e) = store.mark_imported(channel_id).await {
        pb.suspend(|| tracing::warn!(channel_id = %channel_id, "Failed to flush progress: {}", e));
    }
}
