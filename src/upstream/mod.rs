// src/upstream/mod.rs — Streaming platform clients
//
// The reconciler and finalizer only see these traits. `acfun` holds the
// HTTP implementations; tests substitute in-memory fakes.

pub mod acfun;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::VaultError;

/// One live room as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEntry {
    pub session_id: String,
    pub owner_id: i64,
    pub owner_name: String,
    pub stream_name: String,
    pub start_time_ms: i64,
    pub title: String,
}

/// Response to a single directory request of a given size.
#[derive(Debug, Clone, Default)]
pub struct LivePage {
    pub entries: Vec<LiveEntry>,
    /// Upstream signalled that `count` was too small to hold every live.
    pub has_more: bool,
}

/// Lists the sessions that are live right now.
#[async_trait]
pub trait LiveDirectory: Send + Sync {
    async fn fetch_page(&self, count: u64) -> Result<LivePage, VaultError>;
}

/// A vendor-specific copy of a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorUrl {
    pub vendor: String,
    pub url: String,
}

/// Recording descriptor returned by the playback resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playback {
    pub duration_ms: i64,
    pub url: String,
    pub backup_url: String,
    #[serde(default)]
    pub vendor_urls: Vec<VendorUrl>,
}

impl Playback {
    /// Neither the primary nor the backup link is set.
    pub fn is_empty(&self) -> bool {
        self.url.is_empty() && self.backup_url.is_empty()
    }

    /// `EmptyResolution` when there is nothing worth storing.
    pub fn require_links(self, session_id: &str) -> Result<Self, VaultError> {
        if self.is_empty() {
            return Err(VaultError::EmptyResolution {
                session_id: session_id.to_string(),
            });
        }
        Ok(self)
    }

    fn vendor_url(&self, marker: &str) -> Option<&str> {
        if let Some(v) = self
            .vendor_urls
            .iter()
            .find(|v| !v.url.is_empty() && (v.vendor == marker || v.url.contains(marker)))
        {
            return Some(v.url.as_str());
        }
        [self.url.as_str(), self.backup_url.as_str()]
            .into_iter()
            .find(|url| !url.is_empty() && url.contains(marker))
    }

    /// Rearrange links so the `primary` vendor's copy is the playback URL and
    /// the `backup` vendor's copy is the backup URL.
    ///
    /// Returns `false` (leaving the descriptor untouched) unless both vendor
    /// copies are present.
    pub fn prefer_vendors(&mut self, primary: &str, backup: &str) -> bool {
        if self.url.is_empty() {
            return false;
        }
        let (Some(primary_url), Some(backup_url)) =
            (self.vendor_url(primary), self.vendor_url(backup))
        else {
            return false;
        };
        let (primary_url, backup_url) = (primary_url.to_string(), backup_url.to_string());
        self.url = primary_url;
        self.backup_url = backup_url;
        true
    }
}

/// Resolves the recording of a finished live.
#[async_trait]
pub trait PlaybackResolver: Send + Sync {
    async fn resolve(&self, session_id: &str) -> Result<Playback, VaultError>;
}

/// Best-effort side lookup for a platform-specific integer tag of a new live.
#[async_trait]
pub trait AuxTagSource: Send + Sync {
    async fn aux_tag(&self, entry: &LiveEntry) -> Result<i64, VaultError>;
}
