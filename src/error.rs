//! Unified error types for Sprig with fail-open philosophy.
//!
//! Nothing in the store, migration or reward layers may crash the host
//! application. Infrastructure errors are logged and replaced with safe
//! defaults; only the CLI surface reports them to the user.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Sprig operations.
#[derive(Error, Debug)]
pub enum SprigError {
    /// I/O errors from blob file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Persistence backend errors (write refused, payload too large).
    #[error("persistence error: {message}")]
    Persistence { message: String },

    /// A blob or config file that does not parse.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Unreadable or invalid `config.toml`.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed user input at the CLI boundary.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A task, micro-task or thought id that does not exist.
    #[error("not found: {id}")]
    NotFound { id: String },
}

/// A specialized Result type for Sprig operations.
pub type Result<T> = std::result::Result<T, SprigError>;

impl SprigError {
    /// Wrap an I/O error with the blob path it happened at.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

impl From<io::Error> for SprigError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for SprigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Swallow an error on a best-effort path.
///
/// State load, state save, the reward ledger and config all log the error
/// and continue with a fallback instead of propagating.
pub trait FailOpen<T> {
    /// Log `context` and the error at `warn`, then return `T::default()`.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Log `context` and the error at `warn`, then return `fallback`.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "{} failed, continuing with defaults", context);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "{} failed, continuing with fallback", context);
                fallback
            }
        }
    }
}

/// Exit codes for the Sprig CLI.
pub mod exit_codes {
    /// Command succeeded.
    pub const OK: i32 = 0;

    /// Command could not run (no home directory, unreadable state dir).
    pub const ERROR: i32 = 1;

    /// Command rejected its input (unknown id, empty title).
    pub const USAGE: i32 = 2;

    /// Process panicked; state on disk is the last successful write.
    pub const CRASH: i32 = 3;
}
