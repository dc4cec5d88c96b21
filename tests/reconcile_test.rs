// tests/reconcile_test.rs — Integration test: snapshot cycles driving inserts and finalizers

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use streamvault::core::finalizer::{Finalizer, FinalizerPool};
use streamvault::core::playback::PlaybackService;
use streamvault::core::poller::SnapshotPoller;
use streamvault::core::reconciler::Reconciler;
use streamvault::core::retry::RetryPolicy;
use streamvault::core::session::{Session, SessionPool};
use streamvault::infra::config::{FinalizerConfig, PollConfig};
use streamvault::infra::errors::VaultError;
use streamvault::infra::shutdown::Shutdown;
use streamvault::store::{SessionRepository, SessionStore};
use streamvault::upstream::{
    AuxTagSource, LiveDirectory, LiveEntry, LivePage, Playback, PlaybackResolver,
};

// ─── Fakes ──────────────────────────────────────────────────────────────────

/// Serves one scripted listing per call; `None` fails the call.
struct ScriptedDirectory {
    listings: Mutex<VecDeque<Option<Vec<&'static str>>>>,
    calls: Mutex<usize>,
}

impl ScriptedDirectory {
    fn new(listings: Vec<Option<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            listings: Mutex::new(listings.into()),
            calls: Mutex::new(0),
        })
    }
}

#[async_trait]
impl LiveDirectory for ScriptedDirectory {
    async fn fetch_page(&self, _count: u64) -> Result<LivePage, VaultError> {
        *self.calls.lock().unwrap() += 1;
        match self.listings.lock().unwrap().pop_front().flatten() {
            Some(ids) => Ok(LivePage {
                entries: ids
                    .into_iter()
                    .map(|id| LiveEntry {
                        session_id: id.to_string(),
                        owner_id: 100,
                        owner_name: "koi".to_string(),
                        stream_name: format!("stream-{id}"),
                        start_time_ms: 1_600_000_000_000,
                        title: format!("live {id}"),
                    })
                    .collect(),
                has_more: false,
            }),
            None => Err(VaultError::upstream("live-list", "connection reset")),
        }
    }
}

/// Same answer for every call of a given id; counts calls per id.
#[derive(Default)]
struct MapResolver {
    answers: HashMap<&'static str, Playback>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MapResolver {
    fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PlaybackResolver for MapResolver {
    async fn resolve(&self, session_id: &str) -> Result<Playback, VaultError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default() += 1;
        Ok(self.answers.get(session_id).cloned().unwrap_or_default())
    }
}

/// Real store plus a log of every write.
struct RecordingStore {
    inner: SessionStore,
    inserts: Mutex<Vec<String>>,
    playback_updates: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn inserts(&self) -> Vec<String> {
        self.inserts.lock().unwrap().clone()
    }

    fn playback_updates(&self) -> Vec<String> {
        self.playback_updates.lock().unwrap().clone()
    }
}

impl SessionRepository for RecordingStore {
    fn insert_if_absent(&self, session: &Session) -> Result<bool, VaultError> {
        self.inserts.lock().unwrap().push(session.session_id.clone());
        self.inner.insert_if_absent(session)
    }

    fn update_playback(
        &self,
        session_id: &str,
        duration_ms: i64,
        playback_url: &str,
        backup_url: &str,
    ) -> Result<usize, VaultError> {
        self.playback_updates
            .lock()
            .unwrap()
            .push(session_id.to_string());
        self.inner
            .update_playback(session_id, duration_ms, playback_url, backup_url)
    }

    fn update_duration(&self, session_id: &str, duration_ms: i64) -> Result<usize, VaultError> {
        self.inner.update_duration(session_id, duration_ms)
    }

    fn exists(&self, session_id: &str) -> Result<bool, VaultError> {
        self.inner.exists(session_id)
    }
}

struct FixedAux(Result<i64, ()>);

#[async_trait]
impl AuxTagSource for FixedAux {
    async fn aux_tag(&self, _entry: &LiveEntry) -> Result<i64, VaultError> {
        self.0
            .map_err(|_| VaultError::upstream("aux", "timeout"))
    }
}

// ─── Harness ────────────────────────────────────────────────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    directory: Arc<ScriptedDirectory>,
    resolver: Arc<MapResolver>,
    store: Arc<RecordingStore>,
    pool: Arc<SessionPool>,
    finalizers: Arc<FinalizerPool>,
    shutdown: Shutdown,
    reconciler: Reconciler,
}

fn harness(
    listings: Vec<Option<Vec<&'static str>>>,
    answers: HashMap<&'static str, Playback>,
    aux: Option<Arc<dyn AuxTagSource>>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordingStore {
        inner: SessionStore::open(&dir.path().join("vault.db")).unwrap(),
        inserts: Mutex::new(Vec::new()),
        playback_updates: Mutex::new(Vec::new()),
    });
    let directory = ScriptedDirectory::new(listings);
    let resolver = Arc::new(MapResolver {
        answers,
        ..MapResolver::default()
    });
    let pool = SessionPool::new();
    let shutdown = Shutdown::new();

    let playback = Arc::new(PlaybackService::new(
        resolver.clone(),
        RetryPolicy::with_delay(Duration::from_secs(10)),
        "alivod",
        "txvod",
    ));
    let finalizer_config = FinalizerConfig {
        backfill_iterations: 3,
        ..FinalizerConfig::default()
    };
    let finalizers = Arc::new(FinalizerPool::new(
        Arc::new(Finalizer::new(playback, store.clone(), &finalizer_config)),
        pool.clone(),
        shutdown.clone(),
    ));

    let poller = SnapshotPoller::new(directory.clone(), pool.clone(), &PollConfig::default());
    let reconciler = Reconciler::new(
        poller,
        store.clone(),
        pool.clone(),
        finalizers.clone(),
        aux,
        RetryPolicy::with_delay(Duration::from_secs(10)),
        Duration::from_secs(20),
        shutdown.clone(),
    );

    Harness {
        _dir: dir,
        directory,
        resolver,
        store,
        pool,
        finalizers,
        shutdown,
        reconciler,
    }
}

fn finalized(id: &str) -> Playback {
    Playback {
        duration_ms: 3_600_000,
        url: format!("https://alivod.cdn/{id}.0-0.0.m3u8"),
        backup_url: format!("https://txvod.cdn/{id}.m3u8"),
        vendor_urls: vec![],
    }
}

fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_session_lifecycle_across_three_cycles() {
    let mut h = harness(
        vec![Some(vec!["A"]), Some(vec!["A", "B"]), Some(vec!["B"])],
        HashMap::from([("A", finalized("A"))]),
        None,
    );

    let c1 = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(c1.inserted, ids(&["A"]));
    assert!(c1.ended.is_empty());

    let c2 = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(c2.inserted, ids(&["B"]));
    assert!(c2.ended.is_empty());
    assert_eq!(c2.continuing, 1);

    let c3 = h.reconciler.run_cycle().await.unwrap();
    assert!(c3.inserted.is_empty());
    assert_eq!(c3.ended, ids(&["A"]));
    assert_eq!(h.finalizers.in_flight(), 1);
    assert!(h.pool.is_checked_out("A"));

    // A was written once by the loop, once more (ignored) by its finalizer.
    assert_eq!(h.store.inserts(), ids(&["A", "B"]));

    h.finalizers.close_and_wait().await;

    assert_eq!(h.store.inserts(), ids(&["A", "B", "A"]));
    assert_eq!(h.resolver.calls_for("A"), 2);
    assert_eq!(h.resolver.calls_for("B"), 0);
    assert_eq!(h.store.playback_updates(), ids(&["A", "A"]));

    let stored = h.store.inner.get("A").unwrap().unwrap();
    assert_eq!(stored.duration_ms, 3_600_000);
    assert!(stored.playback_url.contains(".0-0.0"));
    assert!(!h.pool.is_checked_out("A"));
    assert!(h.reconciler.previous().contains_key("B"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_resolution_leaves_row_untouched() {
    let mut h = harness(
        vec![Some(vec!["X", "Y"]), Some(vec![])],
        HashMap::from([("Y", finalized("Y"))]),
        None,
    );

    h.reconciler.run_cycle().await.unwrap();
    let report = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(report.ended, ids(&["X", "Y"]));

    h.finalizers.close_and_wait().await;

    assert_eq!(h.store.playback_updates(), ids(&["Y", "Y"]));
    let x = h.store.inner.get("X").unwrap().unwrap();
    assert_eq!(x.playback_url, "");
    assert_eq!(x.duration_ms, 0);
    assert!(!h.shutdown.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_poll_exhaustion_is_fatal() {
    let mut h = harness(vec![None, None, None], HashMap::new(), None);

    let err = h.reconciler.run_cycle().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(*h.directory.calls.lock().unwrap(), 3);
    assert!(h.store.inserts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_recovers_within_retry_budget() {
    let mut h = harness(vec![None, None, Some(vec!["A"])], HashMap::new(), None);

    let report = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(report.inserted, ids(&["A"]));
    assert_eq!(*h.directory.calls.lock().unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_aux_tag_is_best_effort() {
    let mut ok = harness(
        vec![Some(vec!["A"])],
        HashMap::new(),
        Some(Arc::new(FixedAux(Ok(42)))),
    );
    ok.reconciler.run_cycle().await.unwrap();
    assert_eq!(ok.store.inner.get("A").unwrap().unwrap().aux_tag, 42);

    let mut failing = harness(
        vec![Some(vec!["A"])],
        HashMap::new(),
        Some(Arc::new(FixedAux(Err(())))),
    );
    let report = failing.reconciler.run_cycle().await.unwrap();
    assert_eq!(report.inserted, ids(&["A"]));
    assert_eq!(failing.store.inner.get("A").unwrap().unwrap().aux_tag, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_when_cancelled_before_cycle() {
    let mut h = harness(vec![Some(vec!["A"])], HashMap::new(), None);
    h.shutdown.request();

    h.reconciler.run().await.unwrap();
    assert_eq!(*h.directory.calls.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_fatal_error() {
    let mut h = harness(vec![Some(vec!["A"]), None, None, None], HashMap::new(), None);

    let err = h.reconciler.run().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(h.store.inserts(), ids(&["A"]));
}

#[tokio::test(start_paused = true)]
async fn test_continuing_sessions_return_to_pool() {
    let mut h = harness(
        vec![Some(vec!["A", "B"]), Some(vec!["A", "B"])],
        HashMap::new(),
        None,
    );
    h.reconciler.run_cycle().await.unwrap();
    assert_eq!(h.pool.free_len(), 0);

    h.reconciler.run_cycle().await.unwrap();
    assert_eq!(h.pool.free_len(), 2);
    assert_eq!(h.finalizers.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reappearing_session_keeps_single_finalizer() {
    let mut h = harness(
        vec![Some(vec!["A"]), Some(vec![]), Some(vec!["A"]), Some(vec![])],
        HashMap::from([("A", finalized("A"))]),
        None,
    );

    h.reconciler.run_cycle().await.unwrap();
    let gap = h.reconciler.run_cycle().await.unwrap();
    assert_eq!(gap.ended, ids(&["A"]));

    let back = h.reconciler.run_cycle().await.unwrap();
    assert!(back.inserted.is_empty());

    let again = h.reconciler.run_cycle().await.unwrap();
    assert!(again.ended.is_empty());
    assert_eq!(h.finalizers.in_flight(), 1);
    assert_eq!(h.pool.checked_out_len(), 1);
    assert!(h.pool.is_checked_out("A"));

    h.finalizers.close_and_wait().await;

    assert_eq!(h.resolver.calls_for("A"), 2);
    assert_eq!(h.store.playback_updates(), ids(&["A", "A"]));
    assert!(!h.pool.is_checked_out("A"));
}
