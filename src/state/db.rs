//! Checkpoint store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{SecondsFormat, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{
    ChannelRef, ImportStatus, TransferItem, TransferRunStats, TransferState, TransferSummary,
};

/// Durable record of transfer progress.
///
/// Object-safe so the engine can run against `&dyn CheckpointStore`, which is
/// how the tests substitute an in-memory store.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint.
    ///
    /// `Ok(None)` means no checkpoint exists yet (first run). A checkpoint that
    /// exists but cannot be decoded is an error, never `None`.
    async fn load(&self) -> Result<Option<TransferState>, StateError>;

    /// Replace the stored checkpoint with `state`, atomically.
    async fn save(&self, state: &TransferState) -> Result<(), StateError>;

    /// Persist a single `Pending -> Imported` transition.
    async fn mark_imported(&self, channel_id: &str) -> Result<(), StateError>;

    /// Record a failed attempt against a pending channel.
    async fn record_failure(&self, channel_id: &str, error: &str) -> Result<(), StateError>;

    /// Start a new transfer run and return its ID.
    async fn start_run(&self) -> Result<i64, StateError>;

    /// Complete a transfer run with statistics.
    async fn complete_run(&self, run_id: i64, stats: &TransferRunStats) -> Result<(), StateError>;
}

/// SQLite-backed checkpoint kept in a single file.
///
/// The connection is opened lazily: `load` must not create the file, while
/// `save` and the per-item updates create it on first use.
pub struct SqliteCheckpointStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteCheckpointStore {
    /// Create a store for the checkpoint at `path`. Touches nothing on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(None),
            path: path.into(),
        }
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint file is present on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }

    fn malformed(&self, reason: impl ToString) -> StateError {
        StateError::Malformed {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Open an existing checkpoint for reading without creating it.
    fn open_existing(&self) -> Result<Connection, StateError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StateError::Open {
            path: self.path.clone(),
            source: e,
        })?;
        schema::ensure_readable(&conn).map_err(|reason| self.malformed(reason))?;
        Ok(conn)
    }

    /// Open the checkpoint for writing, creating it and its schema if needed.
    fn open_writable(&self) -> Result<Connection, StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    self.malformed(format!("cannot create parent directory: {e}"))
                })?;
            }
        }
        let conn = Connection::open(&self.path).map_err(|e| StateError::Open {
            path: self.path.clone(),
            source: e,
        })?;
        schema::migrate(&conn)?;
        tracing::debug!("Checkpoint opened at {}", self.path.display());
        Ok(conn)
    }

    /// Run `f` against the writable connection, opening it on first use.
    fn with_writable<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.open_writable()?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(StateError::Query("checkpoint connection unavailable".into())),
        }
    }

    /// Run `f` against an existing checkpoint without creating or
    /// initialising it.
    fn with_existing<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.open_existing()?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(StateError::Query("checkpoint connection unavailable".into())),
        }
    }

    /// Get a summary of the checkpoint.
    pub async fn summary(&self) -> Result<TransferSummary, StateError> {
        self.with_existing(|conn| {
            let count = |sql: &str| -> Result<u64, StateError> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n as u64)
                    .map_err(StateError::query)
            };

            let total = count("SELECT COUNT(*) FROM channels")?;
            let imported = count("SELECT COUNT(*) FROM channels WHERE status = 'imported'")?;
            let pending = count("SELECT COUNT(*) FROM channels WHERE status = 'pending'")?;
            let with_errors = count(
                "SELECT COUNT(*) FROM channels WHERE status = 'pending' AND last_error IS NOT NULL",
            )?;
            let runs = count("SELECT COUNT(*) FROM transfer_runs")?;

            let last_run: Option<(i64, Option<i64>, i64)> = conn
                .query_row(
                    "SELECT started_at, completed_at, halted_on_quota FROM transfer_runs ORDER BY id DESC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(StateError::query)?;

            let (last_run_started, last_run_completed, last_run_halted_on_quota) = match last_run
            {
                Some((started, completed, halted)) => (
                    Utc.timestamp_opt(started, 0).single(),
                    completed.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                    halted != 0,
                ),
                None => (None, None, false),
            };

            Ok(TransferSummary {
                total,
                imported,
                pending,
                with_errors,
                runs,
                last_run_started,
                last_run_completed,
                last_run_halted_on_quota,
            })
        })
    }

    /// Pending items that carry a recorded failure, in plan order.
    pub async fn failed_items(&self) -> Result<Vec<TransferItem>, StateError> {
        let items = self.with_existing(|conn| read_items(conn, true))?;
        items
            .into_iter()
            .map(|raw| raw.into_item().map_err(|reason| self.malformed(reason)))
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self) -> Result<Option<TransferState>, StateError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            let present = self
                .path
                .try_exists()
                .map_err(|e| self.malformed(format!("cannot stat checkpoint: {e}")))?;
            if !present {
                tracing::debug!("No checkpoint at {}", self.path.display());
                return Ok(None);
            }
            *guard = Some(self.open_existing()?);
        }
        let Some(conn) = guard.as_ref() else {
            return Ok(None);
        };

        if !has_snapshot(conn).map_err(|e| self.malformed(e))? {
            tracing::warn!(
                "Checkpoint at {} holds no saved snapshot, treating it as a first run",
                self.path.display()
            );
            return Ok(None);
        }

        let raw = read_items(conn, false).map_err(|e| self.malformed(e))?;
        let items = raw
            .into_iter()
            .map(|r| r.into_item().map_err(|reason| self.malformed(reason)))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            items = items.len(),
            "Loaded checkpoint from {}",
            self.path.display()
        );
        Ok(Some(TransferState::from_items(items)))
    }

    async fn save(&self, state: &TransferState) -> Result<(), StateError> {
        let saved_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.with_writable(|conn| {
            let tx = conn.transaction().map_err(StateError::query)?;
            tx.execute("DELETE FROM channels", [])
                .map_err(StateError::query)?;
            {
                let mut stmt = tx
                    .prepare_cached(
                        r#"
                        INSERT INTO channels (position, channel_id, title, kind, status, imported_at, attempts, last_error)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        "#,
                    )
                    .map_err(StateError::query)?;

                for (position, item) in state.items().iter().enumerate() {
                    stmt.execute(rusqlite::params![
                        position as i64,
                        item.channel.id,
                        item.channel.title,
                        item.channel.kind,
                        item.status.as_str(),
                        item.imported_at.map(|dt| dt.timestamp()),
                        item.attempts as i64,
                        item.last_error,
                    ])
                    .map_err(StateError::query)?;
                }
            }
            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                rusqlite::params![schema::SNAPSHOT_MARKER, saved_at],
            )
            .map_err(StateError::query)?;
            // Dropping an uncommitted transaction rolls it back, so a failure
            // above leaves the previous checkpoint intact.
            tx.commit().map_err(StateError::query)?;
            Ok(())
        })?;

        tracing::debug!(items = state.len(), "Saved checkpoint");
        Ok(())
    }

    async fn mark_imported(&self, channel_id: &str) -> Result<(), StateError> {
        let imported_at = Utc::now().timestamp();
        self.with_writable(|conn| {
            conn.execute(
                "UPDATE channels SET status = 'imported', imported_at = ?1, last_error = NULL WHERE channel_id = ?2 AND status = 'pending'",
                rusqlite::params![imported_at, channel_id],
            )
            .map_err(StateError::query)?;
            Ok(())
        })
    }

    async fn record_failure(&self, channel_id: &str, error: &str) -> Result<(), StateError> {
        self.with_writable(|conn| {
            conn.execute(
                "UPDATE channels SET attempts = attempts + 1, last_error = ?1 WHERE channel_id = ?2 AND status = 'pending'",
                rusqlite::params![error, channel_id],
            )
            .map_err(StateError::query)?;
            Ok(())
        })
    }

    async fn start_run(&self) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        self.with_writable(|conn| {
            conn.execute(
                "INSERT INTO transfer_runs (started_at) VALUES (?1)",
                [started_at],
            )
            .map_err(StateError::query)?;
            Ok(conn.last_insert_rowid())
        })
    }

    async fn complete_run(&self, run_id: i64, stats: &TransferRunStats) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        self.with_writable(|conn| {
            conn.execute(
                "UPDATE transfer_runs SET completed_at = ?1, attempted = ?2, imported = ?3, reconciled = ?4, skipped = ?5, deferred = ?6, halted_on_quota = ?7, interrupted = ?8 WHERE id = ?9",
                rusqlite::params![
                    completed_at,
                    stats.attempted as i64,
                    stats.imported as i64,
                    stats.reconciled as i64,
                    stats.skipped as i64,
                    stats.deferred as i64,
                    stats.halted_on_quota as i64,
                    stats.interrupted as i64,
                    run_id,
                ],
            )
            .map_err(StateError::query)?;
            Ok(())
        })
    }
}

/// Row as stored, before the status column is validated.
struct RawItem {
    id: String,
    title: String,
    kind: String,
    status: String,
    imported_at: Option<i64>,
    attempts: i64,
    last_error: Option<String>,
}

impl RawItem {
    fn into_item(self) -> Result<TransferItem, String> {
        let status = ImportStatus::from_str(&self.status).ok_or_else(|| {
            format!(
                "unknown status '{}' for channel {}",
                self.status, self.id
            )
        })?;
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| format!("invalid attempt count {} for channel {}", self.attempts, self.id))?;
        Ok(TransferItem {
            channel: ChannelRef {
                id: self.id,
                title: self.title,
                kind: self.kind,
            },
            status,
            attempts,
            last_error: self.last_error,
            imported_at: self
                .imported_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }
}

/// Whether a `save` has ever committed. Without it the channel table may be
/// empty only because the first save never finished.
fn has_snapshot(conn: &Connection) -> Result<bool, StateError> {
    let marker: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            [schema::SNAPSHOT_MARKER],
            |row| row.get(0),
        )
        .optional()
        .map_err(StateError::query)?;
    Ok(marker.is_some())
}

fn read_items(conn: &Connection, only_failed: bool) -> Result<Vec<RawItem>, StateError> {
    let sql = if only_failed {
        "SELECT channel_id, title, kind, status, imported_at, attempts, last_error FROM channels WHERE status = 'pending' AND last_error IS NOT NULL ORDER BY position"
    } else {
        "SELECT channel_id, title, kind, status, imported_at, attempts, last_error FROM channels ORDER BY position"
    };
    let mut stmt = conn.prepare(sql).map_err(StateError::query)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RawItem {
                id: row.get(0)?,
                title: row.get(1)?,
                kind: row.get(2)?,
                status: row.get(3)?,
                imported_at: row.get(4)?,
                attempts: row.get(5)?,
                last_error: row.get(6)?,
            })
        })
        .map_err(StateError::query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StateError::query)?;
    Ok(rows)
}
