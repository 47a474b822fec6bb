//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = SeqBpeError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during configuration, IO, or parsing.
#[derive(Debug, Error)]
pub enum SeqBpeError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Malformed textual input (FASTA, CSV, token lists).
    #[error("failed to parse {context} at line {line}: {message}")]
    Parse {
        /// Short description of the input being parsed.
        context: String,
        /// One-based line number of the offending record.
        line: usize,
        /// Human readable description of the problem.
        message: String,
    },
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SeqBpeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SeqBpeError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Helper constructor for [`SeqBpeError::Parse`].
    pub fn parse(context: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            line,
            message: message.into(),
        }
    }
}
