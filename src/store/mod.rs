// src/store/mod.rs — SQLite session store
//
// One writer connection guarded by a mutex serialises every write; SQLite
// only admits one writer at a time anyway. Each read opens its own read-only
// connection, so readers never queue behind each other or behind the writer
// (WAL mode).

pub mod schema;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::core::session::Session;
use crate::infra::errors::VaultError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SESSION_COLUMNS: &str = "session_id, owner_id, owner_name, stream_name, start_time, title,
     duration_ms, playback_url, backup_url, aux_tag";

/// Write/probe operations the reconciler and finalizers need.
///
/// Implemented by `SessionStore`; tests substitute recording fakes.
pub trait SessionRepository: Send + Sync {
    /// Insert a new row. Returns `false` when the session id or stream name
    /// already exists; that is never an error.
    fn insert_if_absent(&self, session: &Session) -> Result<bool, VaultError>;

    /// Set the playback fields. Returns the number of rows touched (0 when
    /// the id is unknown).
    fn update_playback(
        &self,
        session_id: &str,
        duration_ms: i64,
        playback_url: &str,
        backup_url: &str,
    ) -> Result<usize, VaultError>;

    fn update_duration(&self, session_id: &str, duration_ms: i64) -> Result<usize, VaultError>;

    fn exists(&self, session_id: &str) -> Result<bool, VaultError>;
}

pub struct SessionStore {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl SessionStore {
    /// Open (or create) the database at the given path and migrate it.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::run_migrations(&conn)?;

        tracing::debug!(path = %path.display(), "Session store opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied on the SQLite side.
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reader(&self) -> Result<Connection, VaultError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Fetch a single stored session.
    pub fn get(&self, session_id: &str) -> Result<Option<Session>, VaultError> {
        let conn = self.reader()?;
        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
                params![session_id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Sessions of one owner, newest first, optionally capped at `limit`.
    pub fn list_by_owner(
        &self,
        owner_id: i64,
        limit: Option<u32>,
    ) -> Result<Vec<Session>, VaultError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE owner_id = ?1
             ORDER BY start_time DESC
             LIMIT ?2"
        ))?;
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = stmt.query_map(params![owner_id, limit], session_from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}

impl SessionRepository for SessionStore {
    fn insert_if_absent(&self, session: &Session) -> Result<bool, VaultError> {
        let inserted = self.writer().execute(
            &format!(
                "INSERT OR IGNORE INTO sessions ({SESSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                session.session_id,
                session.owner_id,
                session.owner_name,
                session.stream_name,
                session.start_time_ms,
                session.title,
                session.duration_ms,
                session.playback_url,
                session.backup_url,
                session.aux_tag
            ],
        )?;
        Ok(inserted > 0)
    }

    fn update_playback(
        &self,
        session_id: &str,
        duration_ms: i64,
        playback_url: &str,
        backup_url: &str,
    ) -> Result<usize, VaultError> {
        let changed = self.writer().execute(
            "UPDATE sessions SET duration_ms = ?1, playback_url = ?2, backup_url = ?3
             WHERE session_id = ?4",
            params![duration_ms, playback_url, backup_url, session_id],
        )?;
        Ok(changed)
    }

    fn update_duration(&self, session_id: &str, duration_ms: i64) -> Result<usize, VaultError> {
        let changed = self.writer().execute(
            "UPDATE sessions SET duration_ms = ?1 WHERE session_id = ?2",
            params![duration_ms, session_id],
        )?;
        Ok(changed)
    }

    fn exists(&self, session_id: &str) -> Result<bool, VaultError> {
        let conn = self.reader()?;
        let owner: Option<i64> = conn
            .query_row(
                "SELECT owner_id FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner.is_some())
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        session_id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_name: row.get(2)?,
        stream_name: row.get(3)?,
        start_time_ms: row.get(4)?,
        title: row.get(5)?,
        duration_ms: row.get(6)?,
        playback_url: row.get(7)?,
        backup_url: row.get(8)?,
        aux_tag: row.get(9)?,
    })
}
