// src/core/query.rs — Read-only lookups and on-demand resolution for the console

use std::sync::Arc;

use chrono::{Local, TimeDelta, TimeZone};

use crate::core::playback::PlaybackService;
use crate::core::session::Session;
use crate::infra::errors::VaultError;
use crate::store::{SessionRepository, SessionStore};
use crate::upstream::Playback;

/// Result of a manual `getplayback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackLookup {
    pub session_id: String,
    pub playback: Playback,
    /// True when the stored row was updated with the resolved links.
    pub persisted: bool,
}

/// Result of a bulk refresh for one owner.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: usize,
    pub skipped: usize,
}

pub struct QuerySurface {
    store: Arc<SessionStore>,
    playback: Arc<PlaybackService>,
}

impl QuerySurface {
    pub fn new(store: Arc<SessionStore>, playback: Arc<PlaybackService>) -> Self {
        Self { store, playback }
    }

    /// Stored sessions of an owner, newest first.
    ///
    /// Returns `NotFound` when the owner has no rows; callers report that as
    /// information, not failure.
    pub fn list_owner(&self, owner_id: i64, limit: Option<u32>) -> Result<Vec<Session>, VaultError> {
        let sessions = self.store.list_by_owner(owner_id, limit)?;
        if sessions.is_empty() {
            return Err(VaultError::NotFound {
                what: format!("owner {owner_id}"),
            });
        }
        Ok(sessions)
    }

    /// Resolve a session's recording now (no grace delay). Stored rows get the
    /// new links; unknown sessions only have them reported.
    pub async fn fetch_playback(&self, session_id: &str) -> Result<PlaybackLookup, VaultError> {
        let playback = self.playback.resolve(session_id).await?;

        let mut persisted = false;
        if !playback.is_empty() && self.store.exists(session_id)? {
            persisted = self.store.update_playback(
                session_id,
                playback.duration_ms,
                &playback.url,
                &playback.backup_url,
            )? > 0;
        }

        Ok(PlaybackLookup {
            session_id: session_id.to_string(),
            playback,
            persisted,
        })
    }

    /// Re-resolve every stored session of an owner (or the `limit` newest).
    /// Sessions whose resolution fails or comes back empty are skipped.
    pub async fn refresh_owner(
        &self,
        owner_id: i64,
        limit: Option<u32>,
    ) -> Result<RefreshReport, VaultError> {
        let sessions = self.list_owner(owner_id, limit)?;
        tracing::info!(owner_id, "Refreshing playback links of {} sessions", sessions.len());

        let mut report = RefreshReport::default();
        for session in &sessions {
            let resolved = self
                .playback
                .resolve(&session.session_id)
                .await
                .and_then(|p| p.require_links(&session.session_id));
            match resolved {
                Ok(playback) => {
                    self.store.update_playback(
                        &session.session_id,
                        playback.duration_ms,
                        &playback.url,
                        &playback.backup_url,
                    )?;
                    report.updated += 1;
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.session_id, "{}", e);
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }
}

/// `YYYY-MM-DD HH:MM:SS` in local time; the raw number when out of range.
pub fn format_start_time(start_time_ms: i64) -> String {
    match Local.timestamp_millis_opt(start_time_ms).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => start_time_ms.to_string(),
    }
}

/// `HH:MM:SS`; hours keep counting past 24.
pub fn format_duration(duration_ms: i64) -> String {
    let d = TimeDelta::milliseconds(duration_ms.max(0));
    format!(
        "{:02}:{:02}:{:02}",
        d.num_hours(),
        d.num_minutes() % 60,
        d.num_seconds() % 60
    )
}

pub fn format_session_line(s: &Session) -> String {
    format!(
        "start: {} | uid: {} | name: {} | title: {} | liveID: {} | streamName: {} | duration: {} | playback: {} | backup: {}",
        format_start_time(s.start_time_ms),
        s.owner_id,
        s.owner_name,
        s.title,
        s.session_id,
        s.stream_name,
        format_duration(s.duration_ms),
        s.playback_url,
        s.backup_url
    )
}
