// src/store/schema.rs — Schema + migrations

use rusqlite::{params, Connection};
use tracing::info;

/// A database migration with version, name, and SQL statements.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "sessions",
        up: "CREATE TABLE IF NOT EXISTS sessions (
                session_id   TEXT PRIMARY KEY,
                owner_id     INTEGER NOT NULL,
                owner_name   TEXT NOT NULL,
                stream_name  TEXT NOT NULL UNIQUE,
                start_time   INTEGER NOT NULL,
                title        TEXT NOT NULL,
                duration_ms  INTEGER NOT NULL DEFAULT 0,
                playback_url TEXT NOT NULL DEFAULT '',
                backup_url   TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_session_id ON sessions (session_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_owner_id ON sessions (owner_id);",
    },
    Migration {
        version: 2,
        name: "aux_tag",
        up: "ALTER TABLE sessions ADD COLUMN aux_tag INTEGER NOT NULL DEFAULT 0;",
    },
];

/// Highest applied migration version (0 on a fresh database).
pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )
}

/// Latest version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            "Applying migration {}: {}",
            migration.version, migration.name
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}
