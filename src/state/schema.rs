//! Checkpoint schema definitions and migrations.

use rusqlite::Connection;

use super::error::StateError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 2;

/// Schema DDL for version 1.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS channels (
    position INTEGER PRIMARY KEY,
    channel_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    imported_at INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_channels_status ON channels(status);

CREATE TABLE IF NOT EXISTS transfer_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    attempted INTEGER DEFAULT 0,
    imported INTEGER DEFAULT 0,
    reconciled INTEGER DEFAULT 0,
    skipped INTEGER DEFAULT 0,
    deferred INTEGER DEFAULT 0,
    halted_on_quota INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);
"#;

/// Version 2: key/value metadata. `save` writes [`SNAPSHOT_MARKER`] in the
/// same transaction as the channel rows.
const SCHEMA_V2: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Version 1 files only ever held rows written by a committed save.
const BACKFILL_V2_MARKER: &str = r#"
INSERT OR IGNORE INTO meta (key, value)
SELECT 'snapshot_saved_at', strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
WHERE EXISTS (SELECT 1 FROM channels);
"#;

/// Meta key whose presence means a complete snapshot was committed.
pub(crate) const SNAPSHOT_MARKER: &str = "snapshot_saved_at";

/// Get the current schema version from the database.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StateError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initialize or migrate the schema of a checkpoint being written.
///
/// Idempotent; safe on both new and existing databases.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StateError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StateError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.execute_batch(SCHEMA_V2)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::debug!("Initialized checkpoint schema at version {}", SCHEMA_VERSION);
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            migrate_to_version(conn, version)?;
        }
    }

    Ok(())
}

/// Check the schema of an existing checkpoint before reading it.
///
/// Unlike [`migrate`], a version of 0 is rejected: an existing file without
/// our schema is not a checkpoint, and treating it as empty would throw away
/// whatever the user pointed us at.
pub(crate) fn ensure_readable(conn: &Connection) -> Result<(), String> {
    let version = get_schema_version(conn).map_err(|e| e.to_string())?;
    if version == 0 {
        return Err("no transfer schema present".to_string());
    }
    if version > SCHEMA_VERSION {
        return Err(format!(
            "schema version {version} is newer than supported version {SCHEMA_VERSION}"
        ));
    }
    if version < SCHEMA_VERSION {
        migrate(conn).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn migrate_to_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    match version {
        1 => conn.execute_batch(SCHEMA_V1)?,
        2 => {
            conn.execute_batch(SCHEMA_V2)?;
            conn.execute_batch(BACKFILL_V2_MARKER)?;
        }
        other => tracing::warn!("No migration registered for schema version {}", other),
    }
    set_schema_version(conn, version)?;
    tracing::info!("Migrated checkpoint to schema version {}", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_db_migration() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migration() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_unsupported_version() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let result = migrate(&conn);
        assert!(matches!(
            result,
            Err(StateError::UnsupportedSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transfer_runs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    fn v1_database() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_V1).unwrap();
        set_schema_version(&conn, 1).unwrap();
        conn
    }

    fn has_marker(conn: &Connection) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM meta WHERE key = ?1",
                [SNAPSHOT_MARKER],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_v1_with_rows_gets_snapshot_marker() {
        let conn = v1_database();
        conn.execute(
            "INSERT INTO channels (position, channel_id, title, kind) VALUES (0, 'UC_a', 'Alpha', 'youtube#channel')",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(has_marker(&conn));
    }

    #[test]
    fn test_v1_without_rows_stays_unmarked() {
        let conn = v1_database();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(!has_marker(&conn));
    }

    #[test]
    fn test_ensure_readable_rejects_blank_database() {
        let conn = Connection::open_in_memory().unwrap();
        let err = ensure_readable(&conn).unwrap_err();
        assert!(err.contains("no transfer schema"), "{}", err);
    }

    #[test]
    fn test_ensure_readable_rejects_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 3)
            .unwrap();
        assert!(ensure_readable(&conn).is_err());
    }

    #[test]
    fn test_ensure_readable_accepts_migrated() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert!(ensure_readable(&conn).is_ok());
    }
}
