// src/cli/console.rs — Line-based interactive console
//
// Reads commands from stdin while the reconciler runs. Bad input only prints
// the usage hint; store failures stop the whole process.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::core::query::{format_session_line, QuerySurface};
use crate::infra::errors::VaultError;
use crate::infra::shutdown::Shutdown;

pub const USAGE: &str = "Commands: listall <uid...> | list10 <uid...> | updateall <uid...> | \
                         update10 <uid...> | getplayback <liveID...> | help | quit";

const RECENT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List { owners: Vec<i64>, limit: Option<u32> },
    Refresh { owners: Vec<i64>, limit: Option<u32> },
    GetPlayback(Vec<String>),
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. `None` means malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let args: Vec<&str> = words.collect();

        match (verb, args.is_empty()) {
            ("quit", true) => Some(Self::Quit),
            ("help", true) => Some(Self::Help),
            ("getplayback", false) => Some(Self::GetPlayback(
                args.iter().map(|s| s.to_string()).collect(),
            )),
            ("listall", false) => Some(Self::List {
                owners: parse_owners(&args)?,
                limit: None,
            }),
            ("list10", false) => Some(Self::List {
                owners: parse_owners(&args)?,
                limit: Some(RECENT),
            }),
            ("updateall", false) => Some(Self::Refresh {
                owners: parse_owners(&args)?,
                limit: None,
            }),
            ("update10", false) => Some(Self::Refresh {
                owners: parse_owners(&args)?,
                limit: Some(RECENT),
            }),
            _ => None,
        }
    }
}

fn parse_owners(args: &[&str]) -> Option<Vec<i64>> {
    args.iter()
        .map(|a| a.parse::<i64>().ok().filter(|id| *id >= 0))
        .collect()
}

/// Serve console commands until `quit`, end of input, or shutdown.
pub async fn run_console<R>(reader: R, surface: Arc<QuerySurface>, shutdown: Shutdown)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    tracing::info!("{}", USAGE);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.cancelled() => break,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("Console input closed");
                break;
            }
            Err(e) => {
                tracing::warn!("Cannot read console input: {}", e);
                break;
            }
        };

        let Some(command) = ConsoleCommand::parse(&line) else {
            tracing::info!("{}", USAGE);
            continue;
        };

        if command == ConsoleCommand::Quit {
            tracing::info!("Shutting down, please wait");
            shutdown.request();
            break;
        }

        if let Err(e) = execute(&surface, command).await {
            tracing::error!("Store failure: {}", e);
            shutdown.fail(format!("console: {e}"));
            break;
        }
    }
}

/// Run one command. Only store errors come back as `Err`.
async fn execute(surface: &QuerySurface, command: ConsoleCommand) -> Result<(), VaultError> {
    match command {
        ConsoleCommand::Help | ConsoleCommand::Quit => {
            tracing::info!("{}", USAGE);
        }
        ConsoleCommand::List { owners, limit } => {
            for owner in owners {
                match surface.list_owner(owner, limit) {
                    Ok(sessions) => {
                        for s in &sessions {
                            println!("{}", format_session_line(s));
                        }
                    }
                    Err(e) => informational(e)?,
                }
            }
        }
        ConsoleCommand::Refresh { owners, limit } => {
            for owner in owners {
                match surface.refresh_owner(owner, limit).await {
                    Ok(report) => tracing::info!(
                        owner_id = owner,
                        "Refreshed {} playback links ({} skipped)",
                        report.updated,
                        report.skipped
                    ),
                    Err(e) => informational(e)?,
                }
            }
        }
        ConsoleCommand::GetPlayback(ids) => {
            for id in ids {
                tracing::info!(session_id = %id, "Resolving playback, please wait");
                match surface.fetch_playback(&id).await {
                    Ok(lookup) => {
                        println!(
                            "liveID: {} | playback: {} | backup: {}{}",
                            lookup.session_id,
                            lookup.playback.url,
                            lookup.playback.backup_url,
                            if lookup.persisted { " (stored)" } else { "" }
                        );
                    }
                    Err(e) => informational(e)?,
                }
            }
        }
    }
    Ok(())
}

/// Log lookup misses and upstream failures; hand back store errors.
fn informational(e: VaultError) -> Result<(), VaultError> {
    match e {
        VaultError::Database(_) | VaultError::Io(_) => Err(e),
        other => {
            tracing::info!("{}", other);
            Ok(())
        }
    }
}
