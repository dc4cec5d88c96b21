// src/core/reconciler.rs — Main loop: diff consecutive snapshots
//
// One cycle:
//   1. fetch the current snapshot (bounded retries; exhaustion is fatal)
//   2. new sessions      -> best-effort aux tag, then insert (synchronously)
//   3. ended sessions    -> hand over to a finalizer task
//   4. still-live values -> back to the pool
//   5. current becomes previous; sleep

use std::sync::Arc;
use std::time::Duration;

use crate::core::finalizer::FinalizerPool;
use crate::core::poller::SnapshotPoller;
use crate::core::retry::{retry, RetryPolicy};
use crate::core::session::{Session, SessionPool, Snapshot};
use crate::infra::errors::VaultError;
use crate::infra::shutdown::Shutdown;
use crate::store::SessionRepository;
use crate::upstream::{AuxTagSource, LiveEntry};

/// Keys that changed between two snapshots.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// In `current` only.
    pub started: Vec<String>,
    /// In `previous` only.
    pub ended: Vec<String>,
    /// In both.
    pub continuing: Vec<String>,
}

/// Partition session ids of `previous` and `current`. Each list is sorted.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();
    for id in current.keys() {
        if previous.contains_key(id) {
            diff.continuing.push(id.clone());
        } else {
            diff.started.push(id.clone());
        }
    }
    diff.ended = previous
        .keys()
        .filter(|id| !current.contains_key(*id))
        .cloned()
        .collect();

    diff.started.sort();
    diff.ended.sort();
    diff.continuing.sort();
    diff
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// New sessions actually written (duplicates already stored excluded).
    pub inserted: Vec<String>,
    /// Sessions handed to a newly started finalizer.
    pub ended: Vec<String>,
    pub continuing: usize,
}

pub struct Reconciler {
    poller: SnapshotPoller,
    repo: Arc<dyn SessionRepository>,
    pool: Arc<SessionPool>,
    finalizers: Arc<FinalizerPool>,
    aux: Option<Arc<dyn AuxTagSource>>,
    poll_policy: RetryPolicy,
    interval: Duration,
    shutdown: Shutdown,
    previous: Snapshot,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        poller: SnapshotPoller,
        repo: Arc<dyn SessionRepository>,
        pool: Arc<SessionPool>,
        finalizers: Arc<FinalizerPool>,
        aux: Option<Arc<dyn AuxTagSource>>,
        poll_policy: RetryPolicy,
        interval: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            poller,
            repo,
            pool,
            finalizers,
            aux,
            poll_policy,
            interval,
            shutdown,
            previous: Snapshot::new(),
        }
    }

    /// Sessions currently considered live.
    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }

    /// Loop until shutdown is requested or a cycle fails fatally.
    ///
    /// Cancellation is checked at the top of every cycle; the inter-cycle
    /// sleep also ends early when it fires.
    pub async fn run(&mut self) -> Result<(), VaultError> {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Reconciler started"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let report = self.run_cycle().await?;
            tracing::debug!(
                inserted = report.inserted.len(),
                ended = report.ended.len(),
                continuing = report.continuing,
                finalizers = self.finalizers.in_flight(),
                "Cycle done"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }

        tracing::info!("Reconciler stopped");
        Ok(())
    }

    /// Fetch one snapshot and apply it. Poll exhaustion is returned as fatal.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, VaultError> {
        let poller = &self.poller;
        let current = retry("fetch live list", &self.poll_policy, || poller.fetch_snapshot())
            .await
            .map_err(|e| VaultError::fatal("live list unavailable", e))?;
        self.apply_snapshot(current).await
    }

    /// Diff `current` against the retained snapshot and act on it.
    ///
    /// Every insert finishes before `current` replaces the retained snapshot.
    pub async fn apply_snapshot(&mut self, mut current: Snapshot) -> Result<CycleReport, VaultError> {
        if current.is_empty() {
            tracing::info!("Nobody is live right now");
        }

        let diff = diff_snapshots(&self.previous, &current);
        let mut report = CycleReport {
            continuing: diff.continuing.len(),
            ..CycleReport::default()
        };

        for id in &diff.started {
            let Some(session) = current.get_mut(id) else {
                continue;
            };
            let aux_tag = self.aux_tag_for(session).await;
            session.aux_tag = aux_tag;

            let inserted = self
                .repo
                .insert_if_absent(session)
                .map_err(|e| VaultError::fatal(format!("insert live {id}"), e))?;
            if inserted {
                tracing::info!(
                    session_id = %id,
                    "{} started {:?}",
                    session.owner_label(),
                    session.title
                );
                report.inserted.push(id.clone());
            }
        }

        let previous = std::mem::replace(&mut self.previous, current);

        for (id, session) in previous {
            if self.previous.contains_key(&id) {
                self.pool.release(session);
            } else {
                tracing::info!(
                    session_id = %id,
                    "{} ended; resolving its recording",
                    session.owner_label()
                );
                // A live that dropped out and came back may still have a
                // finalizer running from the earlier gap.
                if self.finalizers.launch(session) {
                    report.ended.push(id);
                }
            }
        }
        report.ended.sort();

        Ok(report)
    }

    /// Aux tag lookup with retries; any failure leaves the tag at 0.
    async fn aux_tag_for(&self, session: &Session) -> i64 {
        let Some(aux) = &self.aux else {
            return 0;
        };

        let entry = LiveEntry {
            session_id: session.session_id.clone(),
            owner_id: session.owner_id,
            owner_name: session.owner_name.clone(),
            stream_name: session.stream_name.clone(),
            start_time_ms: session.start_time_ms,
            title: session.title.clone(),
        };
        let operation = format!("aux tag for live {}", session.session_id);

        match retry(&operation, &self.poll_policy, || aux.aux_tag(&entry)).await {
            Ok(tag) => tag,
            Err(e) => {
                tracing::warn!(session_id = %session.session_id, "Aux tag unavailable: {}", e);
                0
            }
        }
    }
}
