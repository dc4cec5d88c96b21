// src/infra/errors.rs — Error types for StreamVault

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    // Upstream errors (retriable)
    #[error("Upstream '{client}' error: {message}")]
    Upstream {
        client: &'static str,
        message: String,
    },

    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: Box<VaultError>,
    },

    // Resolution outcomes (not retried)
    #[error("Playback for live '{session_id}' has no usable URL")]
    EmptyResolution { session_id: String },

    #[error("No records found for {what}")]
    NotFound { what: String },

    // Shutdown
    #[error("Fatal: {context}: {source}")]
    Fatal {
        context: String,
        #[source]
        source: Box<VaultError>,
    },

    // Infra
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub fn upstream(client: &'static str, message: impl Into<String>) -> Self {
        VaultError::Upstream {
            client,
            message: message.into(),
        }
    }

    /// Wrap an error as fatal; the top-level loop turns these into shutdown.
    pub fn fatal(context: impl Into<String>, source: VaultError) -> Self {
        VaultError::Fatal {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, VaultError::Upstream { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, VaultError::Fatal { .. })
    }
}
