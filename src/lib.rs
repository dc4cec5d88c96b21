// src/lib.rs — Library root for StreamVault

pub mod cli;
pub mod core;
pub mod infra;
pub mod store;
pub mod upstream;
