//! Common error types for windbot

use thiserror::Error;

/// Common result type for windbot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the preprocessor, sequence files and configuration
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error (timelines and execution sequences)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decode error (fingering maps)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML decode error (rig configuration)
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed timeline entry; `index` is 1-based
    #[error("Timeline entry {index}: {reason}")]
    Validation { index: usize, reason: String },

    /// No fingering entry exists for a note
    #[error("No fingering mapping for note {0}")]
    MissingFingering(String),

    /// Malformed or inconsistent execution sequence
    #[error("Invalid execution sequence: {0}")]
    Sequence(String),
}

impl Error {
    /// Shorthand for a timeline validation failure
    pub fn validation(index: usize, reason: impl Into<String>) -> Self {
        Self::Validation {
            index,
            reason: reason.into(),
        }
    }
}
