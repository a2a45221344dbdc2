use anyhow::{Context, Result};

use super::enumerate::fetch_all;
use crate::state::{CheckpointStore, TransferState};
use crate::youtube::SubscriptionSource;

/// Where the work list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOrigin {
    /// Loaded unchanged from an existing checkpoint.
    Resumed,
    /// Built from a fresh enumeration of the source account.
    Snapshot,
}

#[derive(Debug)]
pub struct Plan {
    pub state: TransferState,
    pub origin: PlanOrigin,
}

/// Produce the ordered work list for this run.
///
/// An existing checkpoint always wins and the source account is not read
/// again, so subscriptions added to the source after the first run are not
/// picked up. Without a checkpoint the source is enumerated once and the
/// snapshot is persisted before anything is sent to the destination.
pub async fn build_plan(
    store: &dyn CheckpointStore,
    source: &dyn SubscriptionSource,
) -> Result<Plan> {
    if let Some(state) = store.load().await.context("Failed to load checkpoint")? {
        tracing::info!(
            "Resuming transfer: {} of {} channels imported, {} pending",
            state.imported_count(),
            state.len(),
            state.pending_count()
        );
        if let Some(position) = state.first_pending() {
            tracing::debug!("First pending channel at position {}", position + 1);
        }
        return Ok(Plan {
            state,
            origin: PlanOrigin::Resumed,
        });
    }

    tracing::info!("No checkpoint found, reading source subscriptions");
    let channels = fetch_all(source)
        .await
        .context("Failed to list source subscriptions")?;
    let state = TransferState::from_snapshot(channels);
    store
        .save(&state)
        .await
        .context("Failed to save initial checkpoint")?;
    tracing::info!("Saved snapshot of {} channels", state.len());

    Ok(Plan {
        state,
        origin: PlanOrigin::Snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{ImportStatus, TransferItem};
    use crate::state::{ChannelRef, SqliteCheckpointStore};
    use crate::transfer::mocks::{channels, MemoryStore, MockSource};

    #[tokio::test]
    async fn test_snapshot_when_no_checkpoint() {
        let store = MemoryStore::default();
        let source = MockSource::paged(channels(&["A", "B", "C"]), 2);

        let plan = build_plan(&store, &source).await.unwrap();
        assert_eq!(plan.origin, PlanOrigin::Snapshot);
        assert_eq!(plan.state.len(), 3);
        assert!(plan
            .state
            .items()
            .iter()
            .all(|i| i.status == ImportStatus::Pending));
        assert_eq!(store.stored(), Some(plan.state.clone()));
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn test_resume_ignores_source() {
        let mut state = TransferState::from_snapshot(channels(&["A", "B"]));
        state.mark_imported(0);
        let store = MemoryStore::with_state(state.clone());
        let source = MockSource::paged(channels(&["X", "Y", "Z"]), 50);

        let plan = build_plan(&store, &source).await.unwrap();
        assert_eq!(plan.origin, PlanOrigin::Resumed);
        assert_eq!(plan.state, state);
        assert_eq!(source.calls(), 0);
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_fatal_and_saves_nothing() {
        let store = MemoryStore::default();
        let source = MockSource::paged(channels(&["A", "B"]), 1);
        source.fail_on_page(1);

        let err = build_plan(&store, &source).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to list source subscriptions"));
        assert!(store.stored().is_none());
    }

    #[tokio::test]
    async fn test_initial_save_failure_is_fatal() {
        let store = MemoryStore::default();
        store.set_fail_writes(true);
        let source = MockSource::paged(channels(&["A"]), 50);

        let err = build_plan(&store, &source).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to save initial checkpoint"));
    }

    #[tokio::test]
    async fn test_interrupted_first_save_enumerates_again() {
        let dir = std::env::temp_dir()
            .join("ytsub_transfer_tests")
            .join("plan")
            .join("interrupted_first_save");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.db");

        // A repeated ID violates the UNIQUE constraint mid-transaction,
        // leaving the file created and migrated but with no snapshot.
        let repeated = ChannelRef::new("A", "A");
        let invalid = TransferState::from_items(vec![
            TransferItem::pending(repeated.clone()),
            TransferItem::pending(repeated),
        ]);
        assert!(SqliteCheckpointStore::new(&path).save(&invalid).await.is_err());

        let store = SqliteCheckpointStore::new(&path);
        let source = MockSource::paged(channels(&["A", "B", "C"]), 50);
        let plan = build_plan(&store, &source).await.unwrap();
        assert_eq!(plan.origin, PlanOrigin::Snapshot);
        assert_eq!(plan.state.len(), 3);
        assert_eq!(source.calls(), 1);

        let resumed = build_plan(&SqliteCheckpointStore::new(&path), &source)
            .await
            .unwrap();
        assert_eq!(resumed.origin, PlanOrigin::Resumed);
        assert_eq!(resumed.state, plan.state);
        assert_eq!(source.calls(), 1);
    }
}
