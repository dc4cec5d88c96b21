// src/core/session.rs — Live session record, snapshots and the reuse pool
//
// A `Session` is owned by exactly one holder at a time: the poller builds it,
// the current snapshot owns it while the live is ongoing, and a finalizer
// task takes it over through `SessionPool::checkout` once the live ends.
// Ownership moves; nothing shares a `Session` mutably.

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Upper bound on idle values kept for reuse.
const MAX_FREE_SESSIONS: usize = 4_096;

/// One broadcast instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub owner_id: i64,
    pub owner_name: String,
    pub title: String,
    pub stream_name: String,
    /// Milliseconds since the Unix epoch.
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub playback_url: String,
    pub backup_url: String,
    pub aux_tag: i64,
}

impl Session {
    /// Reset every field so a pooled value carries nothing from its last use.
    pub fn clear(&mut self) {
        self.session_id.clear();
        self.owner_id = 0;
        self.owner_name.clear();
        self.title.clear();
        self.stream_name.clear();
        self.start_time_ms = 0;
        self.duration_ms = 0;
        self.playback_url.clear();
        self.backup_url.clear();
        self.aux_tag = 0;
    }

    /// Short "name (uid)" label used in log lines.
    pub fn owner_label(&self) -> String {
        format!("{} ({})", self.owner_name, self.owner_id)
    }
}

/// Sessions observed live at one poll instant, keyed by session id.
pub type Snapshot = HashMap<String, Session>;

#[derive(Debug, Default)]
struct PoolState {
    free: Vec<Session>,
    checked_out: HashSet<String>,
}

/// Free list of reusable `Session` values plus the set of ids currently
/// checked out by finalizer tasks.
#[derive(Debug, Default)]
pub struct SessionPool {
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take a cleared value from the free list, or allocate a fresh one.
    pub fn acquire(&self) -> Session {
        self.lock().free.pop().unwrap_or_default()
    }

    /// Return a value the caller owns outright.
    pub fn release(&self, mut session: Session) {
        session.clear();
        let mut state = self.lock();
        if state.free.len() < MAX_FREE_SESSIONS {
            state.free.push(session);
        }
    }

    /// Hand a session to a finalizer. The value comes back to the free list
    /// only when the returned guard is dropped.
    ///
    /// At most one guard exists per session id; a second checkout of an id
    /// still held gets its value back as `Err`.
    pub fn checkout(self: &Arc<Self>, session: Session) -> Result<CheckedOutSession, Session> {
        if !self.lock().checked_out.insert(session.session_id.clone()) {
            return Err(session);
        }
        Ok(CheckedOutSession {
            pool: Arc::clone(self),
            session: Some(session),
        })
    }

    pub fn free_len(&self) -> usize {
        self.lock().free.len()
    }

    pub fn checked_out_len(&self) -> usize {
        self.lock().checked_out.len()
    }

    pub fn is_checked_out(&self, session_id: &str) -> bool {
        self.lock().checked_out.contains(session_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // The state is a plain free list; a panic elsewhere cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A session owned by a finalizer task.
#[derive(Debug)]
pub struct CheckedOutSession {
    pool: Arc<SessionPool>,
    session: Option<Session>,
}

impl Deref for CheckedOutSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        // Only `drop` takes the value out.
        self.session.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for CheckedOutSession {
    fn deref_mut(&mut self) -> &mut Session {
        self.session.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for CheckedOutSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.lock().checked_out.remove(&session.session_id);
            self.pool.release(session);
        }
    }
}
