// src/core/finalizer.rs — Per-session recording resolution after a live ends
//
// Workflow for one ended session:
//   1. grace delay (the platform needs a moment to publish the recording)
//   2. resolve with bounded retries; give up on exhaustion or empty links
//   3. insert-if-absent + store the first links
//   4. backfill: every interval, re-resolve until the URL carries the
//      "finalized" marker or the iteration budget runs out
//
// Upstream failures end the workflow for that session only. Store failures
// are fatal for the whole process.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;

use crate::core::playback::PlaybackService;
use crate::core::session::{Session, SessionPool};
use crate::infra::config::FinalizerConfig;
use crate::infra::errors::VaultError;
use crate::infra::shutdown::Shutdown;
use crate::store::SessionRepository;
use crate::upstream::Playback;

/// How a finalizer run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The marker showed up on backfill iteration `iterations`.
    Finalized { iterations: u32 },
    /// Budget spent without ever seeing the marker; the last links stay stored.
    Unconfirmed,
    /// Resolution retries were exhausted.
    ResolveFailed,
    /// The resolver answered with neither a primary nor a backup link.
    EmptyResolution,
}

pub struct Finalizer {
    playback: Arc<PlaybackService>,
    repo: Arc<dyn SessionRepository>,
    grace_delay: Duration,
    backfill_interval: Duration,
    backfill_iterations: u32,
    finalized_marker: String,
}

impl Finalizer {
    pub fn new(
        playback: Arc<PlaybackService>,
        repo: Arc<dyn SessionRepository>,
        config: &FinalizerConfig,
    ) -> Self {
        Self {
            playback,
            repo,
            grace_delay: config.grace_delay(),
            backfill_interval: config.backfill_interval(),
            backfill_iterations: config.backfill_iterations,
            finalized_marker: config.finalized_marker.clone(),
        }
    }

    pub fn is_finalized(&self, playback: &Playback) -> bool {
        playback.url.contains(&self.finalized_marker)
    }

    /// Drive one ended session to completion. Only store errors surface as `Err`.
    pub async fn run(&self, session: &mut Session) -> Result<FinalizeOutcome, VaultError> {
        tokio::time::sleep(self.grace_delay).await;

        let resolved = self
            .playback
            .resolve(&session.session_id)
            .await
            .and_then(|p| p.require_links(&session.session_id));
        let playback = match resolved {
            Ok(p) => p,
            Err(e @ VaultError::EmptyResolution { .. }) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    "Nothing to record for {}: {}",
                    session.owner_label(),
                    e
                );
                return Ok(FinalizeOutcome::EmptyResolution);
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    "Cannot get playback of {}: {}",
                    session.owner_label(),
                    e
                );
                return Ok(FinalizeOutcome::ResolveFailed);
            }
        };

        self.repo.insert_if_absent(session)?;
        self.store_playback(session, &playback)?;

        for iteration in 1..=self.backfill_iterations {
            tokio::time::sleep(self.backfill_interval).await;

            let playback = match self.playback.resolve(&session.session_id).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        iteration,
                        "Backfill of {} stopped: {}",
                        session.owner_label(),
                        e
                    );
                    return Ok(FinalizeOutcome::ResolveFailed);
                }
            };

            if self.is_finalized(&playback) {
                self.store_playback(session, &playback)?;
                tracing::info!(
                    session_id = %session.session_id,
                    iteration,
                    "Complete playback link recorded for {}",
                    session.owner_label()
                );
                return Ok(FinalizeOutcome::Finalized {
                    iterations: iteration,
                });
            }

            // Partial links are not written; the row keeps the first
            // resolution's URL and duration as a matching pair.
        }

        tracing::warn!(
            session_id = %session.session_id,
            "Could not confirm a complete playback link for {} after {} checks; update it manually",
            session.owner_label(),
            self.backfill_iterations
        );
        Ok(FinalizeOutcome::Unconfirmed)
    }

    fn store_playback(&self, session: &mut Session, playback: &Playback) -> Result<(), VaultError> {
        self.repo.update_playback(
            &session.session_id,
            playback.duration_ms,
            &playback.url,
            &playback.backup_url,
        )?;
        session.duration_ms = playback.duration_ms;
        session.playback_url.clone_from(&playback.url);
        session.backup_url.clone_from(&playback.backup_url);
        Ok(())
    }
}

/// Supervised set of running finalizer tasks.
///
/// Each task owns its session through a pool checkout; the value goes back
/// to the pool when the task ends, whatever the exit path.
pub struct FinalizerPool {
    finalizer: Arc<Finalizer>,
    pool: Arc<SessionPool>,
    tracker: TaskTracker,
    shutdown: Shutdown,
}

impl FinalizerPool {
    pub fn new(finalizer: Arc<Finalizer>, pool: Arc<SessionPool>, shutdown: Shutdown) -> Self {
        Self {
            finalizer,
            pool,
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Start finalizing `session`; returns immediately.
    ///
    /// Returns `false` without spawning when a finalizer for the same id is
    /// still running; the value goes straight back to the pool.
    pub fn launch(&self, session: Session) -> bool {
        let mut session = match self.pool.checkout(session) {
            Ok(guard) => guard,
            Err(session) => {
                tracing::info!(
                    session_id = %session.session_id,
                    "Recording of {} is already being resolved",
                    session.owner_label()
                );
                self.pool.release(session);
                return false;
            }
        };
        let finalizer = Arc::clone(&self.finalizer);
        let shutdown = self.shutdown.clone();

        self.tracker.spawn(async move {
            match finalizer.run(&mut session).await {
                Ok(outcome) => {
                    tracing::debug!(session_id = %session.session_id, ?outcome, "Finalizer done");
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %session.session_id,
                        "Store failure while finalizing {}: {}",
                        session.owner_label(),
                        e
                    );
                    shutdown.fail(format!(
                        "store failure while finalizing live {}: {}",
                        session.session_id, e
                    ));
                }
            }
        });
        true
    }

    /// Finalizers still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait for every running finalizer to end.
    pub async fn close_and_wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
