// src/core/poller.rs — Full snapshot of the sessions live right now
//
// The directory answers one request of `count` rooms at a time and signals
// when `count` was too small. Rather than paging, the whole fetch is repeated
// with a geometrically larger `count` until everything fits.

use std::sync::Arc;

use crate::core::session::{Session, SessionPool, Snapshot};
use crate::infra::config::PollConfig;
use crate::infra::errors::VaultError;
use crate::upstream::{LiveDirectory, LiveEntry};

pub struct SnapshotPoller {
    directory: Arc<dyn LiveDirectory>,
    pool: Arc<SessionPool>,
    base_page_size: u64,
    page_growth: u64,
    max_page_size: u64,
}

impl SnapshotPoller {
    pub fn new(directory: Arc<dyn LiveDirectory>, pool: Arc<SessionPool>, config: &PollConfig) -> Self {
        Self {
            directory,
            pool,
            base_page_size: config.base_page_size.max(1),
            page_growth: config.page_growth.max(2),
            max_page_size: config.max_page_size,
        }
    }

    /// Produce a snapshot of every live session, or fail.
    ///
    /// Fails when the directory still reports more data at `max_page_size`,
    /// which guards against a broken cursor growing the request forever.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot, VaultError> {
        let mut count = self.base_page_size;

        let entries = loop {
            let page = self.directory.fetch_page(count).await?;
            if !page.has_more {
                break page.entries;
            }
            if count >= self.max_page_size {
                return Err(VaultError::upstream(
                    "live-list",
                    format!("still more data at page size {count}; giving up"),
                ));
            }
            tracing::debug!(count, "Live list truncated, growing page size");
            count = count.saturating_mul(self.page_growth).min(self.max_page_size);
        };

        let mut snapshot = Snapshot::with_capacity(entries.len());
        for entry in entries {
            let session = self.session_from(entry);
            if let Some(duplicate) = snapshot.insert(session.session_id.clone(), session) {
                self.pool.release(duplicate);
            }
        }
        Ok(snapshot)
    }

    fn session_from(&self, entry: LiveEntry) -> Session {
        let mut session = self.pool.acquire();
        session.session_id = entry.session_id;
        session.owner_id = entry.owner_id;
        session.owner_name = entry.owner_name;
        session.stream_name = entry.stream_name;
        session.start_time_ms = entry.start_time_ms;
        session.title = entry.title;
        session
    }
}
