// src/infra/shutdown.rs — Process-wide cancellation
//
// `quit`, OS signals and fatal errors all funnel into the same token. A fatal
// error also records why, so `main` can exit non-zero.

use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    failure: Arc<OnceLock<String>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orderly stop (quit command, signal).
    pub fn request(&self) {
        self.token.cancel();
    }

    /// Stop because something unrecoverable happened. The first reason wins.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.failure.set(reason.into());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }
}

/// Wait for Ctrl-C, SIGTERM or SIGQUIT (or an internal shutdown) and cancel.
pub async fn watch_signals(shutdown: Shutdown) {
    tokio::select! {
        _ = os_signal() => {
            tracing::info!("Shutting down, please wait");
            shutdown.request();
        }
        _ = shutdown.cancelled() => {}
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
        (Ok(mut term), Ok(mut quit)) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = term.recv() => {}
                _ = quit.recv() => {}
            }
        }
        _ => {
            tracing::warn!("Cannot install SIGTERM/SIGQUIT handlers; only Ctrl-C will stop");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
