//! Checkpoint store for transfer progress.
//!
//! The whole transfer state lives in one SQLite file. It records, in plan
//! order, every channel captured by the first source enumeration and whether
//! it has been imported into the destination account, so that:
//! - a run halted by the daily quota resumes at the first pending channel
//! - imported channels are never attempted again
//! - repeated failures are visible through `status`

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{CheckpointStore, SqliteCheckpointStore};
pub use types::{ChannelRef, TransferRunStats, TransferState};
