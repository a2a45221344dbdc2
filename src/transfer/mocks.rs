//! In-memory stand-ins for the source, destination and checkpoint store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::state::error::StateError;
use crate::state::{ChannelRef, CheckpointStore, TransferRunStats, TransferState};
use crate::youtube::{ApiError, ApiErrorKind, SubscriptionPage, SubscriptionSink, SubscriptionSource};

pub fn channels(ids: &[&str]) -> Vec<ChannelRef> {
    ids.iter()
        .map(|id| ChannelRef::new(*id, format!("Channel {id}")))
        .collect()
}

/// Source account listing served in fixed-size pages. Tokens are page indices.
pub struct MockSource {
    channels: Mutex<Vec<ChannelRef>>,
    page_size: usize,
    calls: AtomicUsize,
    failing_page: Mutex<Option<usize>>,
}

impl MockSource {
    pub fn paged(channels: Vec<ChannelRef>, page_size: usize) -> Self {
        Self {
            channels: Mutex::new(channels),
            page_size: page_size.max(1),
            calls: AtomicUsize::new(0),
            failing_page: Mutex::new(None),
        }
    }

    /// Subscribe the source account to one more channel.
    pub fn push(&self, channel: ChannelRef) {
        self.channels.lock().unwrap().push(channel);
    }

    pub fn fail_on_page(&self, page: usize) {
        *self.failing_page.lock().unwrap() = Some(page);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SubscriptionSource for MockSource {
    async fn list_page(&self, page_token: Option<&str>) -> Result<SubscriptionPage, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page: usize = page_token.map_or(0, |t| t.parse().unwrap());
        if *self.failing_page.lock().unwrap() == Some(page) {
            return Err(ApiError::remote(
                ApiErrorKind::Other,
                500,
                "backendError",
                "Backend Error",
            ));
        }
        let all = self.channels.lock().unwrap();
        let start = (page * self.page_size).min(all.len());
        let end = (start + self.page_size).min(all.len());
        let next_page_token = (end < all.len()).then(|| (page + 1).to_string());
        Ok(SubscriptionPage {
            channels: all[start..end].to_vec(),
            next_page_token,
        })
    }
}

/// A source whose listing never ends: every page points at the same token.
pub struct LoopingSource;

#[async_trait::async_trait]
impl SubscriptionSource for LoopingSource {
    async fn list_page(&self, _page_token: Option<&str>) -> Result<SubscriptionPage, ApiError> {
        Ok(SubscriptionPage {
            channels: channels(&["A"]),
            next_page_token: Some("same".into()),
        })
    }
}

/// Destination account with a daily quota counted in insert calls.
pub struct MockSink {
    subscribed: Mutex<HashSet<String>>,
    quota: Mutex<Option<usize>>,
    failing: HashSet<String>,
    inserts: Mutex<Vec<String>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            subscribed: Mutex::new(HashSet::new()),
            quota: Mutex::new(None),
            failing: HashSet::new(),
            inserts: Mutex::new(Vec::new()),
        }
    }

    /// Allow only `calls` more insert requests.
    pub fn with_quota(self, calls: usize) -> Self {
        *self.quota.lock().unwrap() = Some(calls);
        self
    }

    /// Channels the destination rejects with a non-quota error.
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Channels the destination already subscribes to.
    pub fn already_subscribed(self, ids: &[&str]) -> Self {
        self.subscribed
            .lock()
            .unwrap()
            .extend(ids.iter().map(|s| s.to_string()));
        self
    }

    /// A new day: reset the quota.
    pub fn refill(&self, calls: Option<usize>) {
        *self.quota.lock().unwrap() = calls;
    }

    pub fn subscribed(&self) -> HashSet<String> {
        self.subscribed.lock().unwrap().clone()
    }

    /// Every insert request received, in order.
    pub fn inserts(&self) -> Vec<String> {
        self.inserts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SubscriptionSink for MockSink {
    async fn insert(&self, channel: &ChannelRef) -> Result<(), ApiError> {
        self.inserts.lock().unwrap().push(channel.id.clone());
        {
            let mut quota = self.quota.lock().unwrap();
            if let Some(remaining) = quota.as_mut() {
                if *remaining == 0 {
                    return Err(ApiError::remote(
                        ApiErrorKind::QuotaExceeded,
                        403,
                        "quotaExceeded",
                        "The request cannot be completed because you have exceeded your quota.",
                    ));
                }
                *remaining -= 1;
            }
        }
        if self.failing.contains(&channel.id) {
            return Err(ApiError::remote(
                ApiErrorKind::Other,
                404,
                "publisherNotFound",
                "The resource identified by the request's publisher parameter cannot be found.",
            ));
        }
        if !self.subscribed.lock().unwrap().insert(channel.id.clone()) {
            return Err(ApiError::remote(
                ApiErrorKind::Duplicate,
                400,
                "subscriptionDuplicate",
                "The subscription that you are trying to create already exists.",
            ));
        }
        Ok(())
    }
}

/// Checkpoint kept in memory, with switchable write failures.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<TransferState>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
    runs: Mutex<Vec<TransferRunStats>>,
}

impl MemoryStore {
    pub fn with_state(state: TransferState) -> Self {
        let store = Self::default();
        *store.state.lock().unwrap() = Some(state);
        store
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Option<TransferState> {
        self.state.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn completed_runs(&self) -> Vec<TransferRunStats> {
        self.runs.lock().unwrap().clone()
    }

    fn check_writable(&self) -> Result<(), StateError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StateError::Query("disk full".into()));
        }
        Ok(())
    }

    fn position(state: &TransferState, channel_id: &str) -> Option<usize> {
        state.items().iter().position(|i| i.id() == channel_id)
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self) -> Result<Option<TransferState>, StateError> {
        Ok(self.stored())
    }

    async fn save(&self, state: &TransferState) -> Result<(), StateError> {
        self.check_writable()?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    async fn mark_imported(&self, channel_id: &str) -> Result<(), StateError> {
        self.check_writable()?;
        let mut guard = self.state.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            if let Some(index) = Self::position(state, channel_id) {
                state.mark_imported(index);
            }
        }
        Ok(())
    }

    async fn record_failure(&self, channel_id: &str, error: &str) -> Result<(), StateError> {
        self.check_writable()?;
        let mut guard = self.state.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            if let Some(index) = Self::position(state, channel_id) {
                state.record_failure(index, error);
            }
        }
        Ok(())
    }

    async fn start_run(&self) -> Result<i64, StateError> {
        self.check_writable()?;
        Ok(self.runs.lock().unwrap().len() as i64 + 1)
    }

    async fn complete_run(&self, _run_id: i64, stats: &TransferRunStats) -> Result<(), StateError> {
        self.check_writable()?;
        self.runs.lock().unwrap().push(stats.clone());
        Ok(())
    }
}
