//! Error types for windbot-player
//!
//! A user stop is reported as [`Error::Cancelled`], never folded into a
//! failure variant, so callers can tell "stopped" from "broke".

use thiserror::Error;

/// Main error type for the playback crate
#[derive(Error, Debug)]
pub enum Error {
    /// Preprocessing, sequence file or configuration errors
    #[error(transparent)]
    Common(#[from] windbot_common::Error),

    /// Frame or air-supply dispatch failure (logged, never fatal mid-replay)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Playback was stopped on request
    #[error("Playback cancelled")]
    Cancelled,

    /// Outstanding dispatches did not settle within the grace window
    #[error("Dispatches still in flight after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// Replay task failed outside the timing loop (e.g. panicked)
    #[error("Playback error: {0}")]
    Playback(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File or device I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Convenience Result type using windbot-player Error
pub type Result<T> = std::result::Result<T, Error>;
