// src/cli/mod.rs — CLI definition (clap derive)

pub mod console;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "streamvault",
    about = "Track live sessions and archive their recording links",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides [store].path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Watch live sessions and archive recordings (default)
    Run,
    /// Print stored sessions of a broadcaster, newest first
    List {
        /// Broadcaster uid
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        owner: i64,
        /// Only the N most recent sessions
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Resolve the recording links of one or more lives now
    Playback {
        #[arg(required = true)]
        session_ids: Vec<String>,
    },
}
