// src/core/playback.rs — Retrying playback resolution shared by the
// finalizer and the query surface

use std::sync::Arc;

use crate::core::retry::{retry, RetryPolicy};
use crate::infra::errors::VaultError;
use crate::upstream::{Playback, PlaybackResolver};

pub struct PlaybackService {
    resolver: Arc<dyn PlaybackResolver>,
    policy: RetryPolicy,
    primary_vendor: String,
    backup_vendor: String,
}

impl PlaybackService {
    pub fn new(
        resolver: Arc<dyn PlaybackResolver>,
        policy: RetryPolicy,
        primary_vendor: impl Into<String>,
        backup_vendor: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            policy,
            primary_vendor: primary_vendor.into(),
            backup_vendor: backup_vendor.into(),
        }
    }

    /// Resolve a session's recording with bounded retries, then put the
    /// preferred vendor's copy first.
    pub async fn resolve(&self, session_id: &str) -> Result<Playback, VaultError> {
        let operation = format!("resolve playback for live {session_id}");
        let mut playback = retry(&operation, &self.policy, || self.resolver.resolve(session_id)).await?;

        if !playback.url.is_empty()
            && !playback.prefer_vendors(&self.primary_vendor, &self.backup_vendor)
        {
            tracing::info!(
                session_id,
                "Could not tell {} and {} playback links apart; keeping resolver order",
                self.primary_vendor,
                self.backup_vendor
            );
        }
        Ok(playback)
    }
}
