//! Error types for the load tester.
//!
//! [`LoadError`] covers fatal startup failures. [`CallError`] covers the
//! per-request faults that a worker counts and moves past.

use std::path::PathBuf;

/// Failures that stop the run before any worker is spawned.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A corpus file could not be read.
    #[error("failed to read corpus file '{}': {source}", .path.display())]
    CorpusIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration is unusable (zero workers, bad URL, ...).
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Transport-level faults of a single call.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The call exceeded the request timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection refused or reset, malformed status line and the like.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl CallError {
    /// Classify a [`reqwest::Error`] into a [`CallError`].
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}
