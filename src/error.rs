//! Error types for transcript-harvest
//!
//! Only startup problems and output-table write failures surface as [`Error`].
//! A single identifier's fetch failing is not an error at this level: it is
//! carried as a [`FetchOutcome::Failure`](crate::types::FetchOutcome) value
//! so that one entity can never abort the run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for transcript-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for transcript-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "baseApiUrl")
        key: Option<String>,
    },

    /// The input table could not be read
    #[error("cannot read input table {}: {message}", path.display())]
    InputTable {
        /// Location of the input table
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL could not be built from the configured base
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A batch could not be handed to the output table
    #[error("flush failed: {message}")]
    Flush {
        /// Why the flush did not complete
        message: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific settings key.
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
