//! Types for the checkpoint store.

use std::collections::HashSet;

use chrono::{DateTime, SubsecRound, Utc};

/// Resource kind the destination expects in an insert payload.
pub const CHANNEL_KIND: &str = "youtube#channel";

/// Identity of one subscribable channel, captured verbatim from the source
/// listing and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    /// Channel ID (`snippet.resourceId.channelId`).
    pub id: String,
    /// Display title, used only for progress output.
    pub title: String,
    /// Resource kind (`snippet.resourceId.kind`).
    pub kind: String,
}

impl ChannelRef {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: CHANNEL_KIND.to_string(),
        }
    }
}

/// Import status of a transfer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    /// Not yet confirmed on the destination account.
    Pending,
    /// Confirmed on the destination account. Terminal.
    Imported,
}

impl ImportStatus {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Imported => "imported",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "imported" => Some(Self::Imported),
            _ => None,
        }
    }
}

/// One unit of work: a channel plus its import status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub channel: ChannelRef,
    pub status: ImportStatus,
    /// Failed insert attempts (duplicate and quota responses excluded).
    pub attempts: u32,
    /// Most recent failure message, cleared once imported.
    pub last_error: Option<String>,
    /// When the item flipped to `Imported`.
    pub imported_at: Option<DateTime<Utc>>,
}

impl TransferItem {
    /// Create a new pending item.
    pub fn pending(channel: ChannelRef) -> Self {
        Self {
            channel,
            status: ImportStatus::Pending,
            attempts: 0,
            last_error: None,
            imported_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.channel.id
    }

    pub fn is_imported(&self) -> bool {
        self.status == ImportStatus::Imported
    }
}

/// The full ordered work list of one transfer.
///
/// The set of channel IDs is fixed when the state is built from the first
/// enumeration. Afterwards the only mutation is `Pending -> Imported` plus
/// failure bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferState {
    items: Vec<TransferItem>,
}

impl TransferState {
    /// Build a fresh state from a source snapshot, every item pending.
    ///
    /// Repeated channel IDs keep their first position.
    pub fn from_snapshot(channels: Vec<ChannelRef>) -> Self {
        let mut seen = HashSet::with_capacity(channels.len());
        let mut items = Vec::with_capacity(channels.len());
        for channel in channels {
            if !seen.insert(channel.id.clone()) {
                tracing::warn!(
                    channel_id = %channel.id,
                    "Channel listed twice by the source, keeping first occurrence"
                );
                continue;
            }
            items.push(TransferItem::pending(channel));
        }
        Self { items }
    }

    /// Rehydrate a state from stored items, preserving their order.
    pub(crate) fn from_items(items: Vec<TransferItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn imported_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_imported()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.len() - self.imported_count()
    }

    /// Whether every item has been imported.
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(TransferItem::is_imported)
    }

    /// Position of the first item still pending, where the next run resumes.
    pub fn first_pending(&self) -> Option<usize> {
        self.items.iter().position(|i| !i.is_imported())
    }

    /// Flip the item at `index` to `Imported`.
    ///
    /// Returns `false` when the item was already imported (no-op).
    pub fn mark_imported(&mut self, index: usize) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        if item.is_imported() {
            return false;
        }
        item.status = ImportStatus::Imported;
        // The checkpoint keeps whole seconds.
        item.imported_at = Some(Utc::now().trunc_subsecs(0));
        item.last_error = None;
        true
    }

    /// Record a failed attempt on a pending item. Imported items are left alone.
    pub fn record_failure(&mut self, index: usize, error: &str) {
        if let Some(item) = self.items.get_mut(index) {
            if item.is_imported() {
                return;
            }
            item.attempts = item.attempts.saturating_add(1);
            item.last_error = Some(error.to_string());
        }
    }
}

/// Counters for a single transfer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRunStats {
    /// Insert requests sent to the destination.
    pub attempted: u64,
    /// Items newly subscribed on the destination.
    pub imported: u64,
    /// Items the destination already held (duplicate response).
    pub reconciled: u64,
    /// Items skipped because the checkpoint already had them imported.
    pub skipped: u64,
    /// Items that failed and stay pending.
    pub deferred: u64,
    /// Whether the run stopped on quota exhaustion.
    pub halted_on_quota: bool,
    /// Whether the run stopped on a shutdown signal.
    pub interrupted: bool,
}

/// Summary of the checkpoint database.
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub total: u64,
    pub imported: u64,
    pub pending: u64,
    /// Pending items carrying a recorded failure.
    pub with_errors: u64,
    pub runs: u64,
    pub last_run_started: Option<DateTime<Utc>>,
    pub last_run_completed: Option<DateTime<Utc>>,
    pub last_run_halted_on_quota: bool,
}
