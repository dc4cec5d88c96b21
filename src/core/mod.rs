// src/core/mod.rs — Session tracking engine

pub mod finalizer;
pub mod playback;
pub mod poller;
pub mod query;
pub mod reconciler;
pub mod retry;
pub mod session;
