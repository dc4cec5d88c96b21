// src/main.rs — StreamVault entry point

use clap::Parser;
use std::sync::Arc;

use streamvault::cli::console::run_console;
use streamvault::cli::{Cli, Commands};
use streamvault::core::finalizer::{Finalizer, FinalizerPool};
use streamvault::core::playback::PlaybackService;
use streamvault::core::poller::SnapshotPoller;
use streamvault::core::query::{format_session_line, QuerySurface};
use streamvault::core::reconciler::Reconciler;
use streamvault::core::retry::RetryPolicy;
use streamvault::core::session::SessionPool;
use streamvault::infra::config::Config;
use streamvault::infra::errors::VaultError;
use streamvault::infra::logger;
use streamvault::infra::shutdown::{watch_signals, Shutdown};
use streamvault::store::SessionStore;
use streamvault::upstream::acfun::{AcFunDirectory, AcFunPlayback};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    // Exit without dropping the runtime: the blocking stdin reader would
    // otherwise hold shutdown until the next line of input.
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db_path = cli.db.clone().unwrap_or_else(|| config.store.resolved_path());
    let store = Arc::new(SessionStore::open(&db_path)?);

    let playback = Arc::new(PlaybackService::new(
        Arc::new(AcFunPlayback::new(&config.upstream)?),
        RetryPolicy::with_delay(config.finalizer.retry_delay()),
        config.upstream.primary_vendor.clone(),
        config.upstream.backup_vendor.clone(),
    ));
    let surface = Arc::new(QuerySurface::new(Arc::clone(&store), Arc::clone(&playback)));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::List { owner, limit } => {
            match surface.list_owner(owner, limit) {
                Ok(sessions) => sessions
                    .iter()
                    .for_each(|s| println!("{}", format_session_line(s))),
                Err(VaultError::NotFound { what }) => println!("No records found for {what}"),
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        Commands::Playback { session_ids } => {
            for id in session_ids {
                let lookup = surface.fetch_playback(&id).await?;
                println!(
                    "liveID: {} | playback: {} | backup: {}",
                    lookup.session_id, lookup.playback.url, lookup.playback.backup_url
                );
            }
            Ok(())
        }
        Commands::Run => run_daemon(&config, store, playback, surface).await,
    }
}

async fn run_daemon(
    config: &Config,
    store: Arc<SessionStore>,
    playback: Arc<PlaybackService>,
    surface: Arc<QuerySurface>,
) -> anyhow::Result<()> {
    tracing::info!(db = %store.path().display(), "StreamVault starting");

    let shutdown = Shutdown::new();
    tokio::spawn(watch_signals(shutdown.clone()));
    tokio::spawn(run_console(
        tokio::io::BufReader::new(tokio::io::stdin()),
        surface,
        shutdown.clone(),
    ));

    let pool = SessionPool::new();
    let poller = SnapshotPoller::new(
        Arc::new(AcFunDirectory::new(&config.upstream)?),
        Arc::clone(&pool),
        &config.poll,
    );
    let finalizer = Finalizer::new(playback, store.clone(), &config.finalizer);
    let finalizers = Arc::new(FinalizerPool::new(
        Arc::new(finalizer),
        Arc::clone(&pool),
        shutdown.clone(),
    ));

    let mut reconciler = Reconciler::new(
        poller,
        store,
        pool,
        Arc::clone(&finalizers),
        None,
        RetryPolicy::with_delay(config.poll.retry_delay()),
        config.poll.interval(),
        shutdown.clone(),
    );

    if let Err(e) = reconciler.run().await {
        tracing::error!("{}", e);
        shutdown.fail(e.to_string());
    }
    shutdown.request();

    let abandoned = finalizers.in_flight();
    if abandoned > 0 {
        tracing::warn!("{} recordings were still being resolved and are left as stored", abandoned);
    }

    match shutdown.failure() {
        Some(reason) => anyhow::bail!("{reason}"),
        None => {
            tracing::info!("StreamVault stopped");
            Ok(())
        }
    }
}
