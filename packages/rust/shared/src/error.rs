//! Error types for outlinekb.
//!
//! Library crates use [`OutlineKbError`] via `thiserror`.
//! App crates (`outlinekb`, `fill-hooks`) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all outlinekb operations.
#[derive(Debug, thiserror::Error)]
pub enum OutlineKbError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// No usable outline (or note) file was found.
    #[error("input missing: {message}")]
    InputMissing { message: String },

    /// File content is neither UTF-8 nor GBK.
    #[error("could not decode {path:?} as UTF-8 or GBK")]
    Decode { path: PathBuf },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Transport failure talking to the completion service.
    #[error("network error: {0}")]
    Network(String),

    /// The completion service answered, but not usefully (status, auth, quota, format).
    #[error("completion error: {0}")]
    Completion(String),

    /// Invalid argument or data.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OutlineKbError>;

impl OutlineKbError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input-missing error from any displayable message.
    pub fn input_missing(msg: impl Into<String>) -> Self {
        Self::InputMissing {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
