//! Crate-level error type.
//!
//! Each module reports its own error enum. [`Error`] wraps all of them for
//! callers that drive the whole pipeline, and [`Error::kind`] folds them into
//! a small taxonomy a front end can branch on.

use std::fmt;

use thiserror::Error;

use crate::actions::{ExecuteError, ValidationError};
use crate::scanner::{HashError, ScanError};
use crate::signal::SignalError;
use crate::store::{HashParseError, StoreError};

/// Coarse classification of any dupestore failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A path that should exist does not (or an index record is missing)
    NotFound,
    /// A directory or special file where a regular file was required
    NotAFile,
    /// A symbolic link where a regular file was required
    IsSymlink,
    /// Keep and delete sets overlap, or a hash would lose its last copy
    InvariantViolation,
    /// The index database could not be opened
    StoreUnavailable,
    /// Filesystem or database I/O failure
    Io,
    /// Stopped by a shutdown request
    Interrupted,
    /// Invalid configuration
    Config,
    /// Anything else
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::NotAFile => "not a file",
            Self::IsSymlink => "is a symlink",
            Self::InvariantViolation => "invariant violation",
            Self::StoreUnavailable => "store unavailable",
            Self::Io => "i/o error",
            Self::Interrupted => "interrupted",
            Self::Config => "configuration error",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

/// Any error produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error(transparent)]
    HashParse(#[from] HashParseError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => store_kind(e),
            Self::Scan(e) => match e {
                ScanError::NotFound(_) => ErrorKind::NotFound,
                ScanError::NotADirectory(_) => ErrorKind::NotAFile,
                ScanError::PermissionDenied(_) | ScanError::Io { .. } => ErrorKind::Io,
                ScanError::Interrupted => ErrorKind::Interrupted,
                ScanError::ThreadPool(_) => ErrorKind::Other,
                ScanError::Store(e) => store_kind(e),
            },
            Self::Hash(e) => match e {
                HashError::NotFound(_) => ErrorKind::NotFound,
                HashError::PermissionDenied(_) | HashError::Io { .. } => ErrorKind::Io,
            },
            Self::Validation(e) => match e {
                ValidationError::InvariantViolation { .. } | ValidationError::NoSurvivor { .. } => {
                    ErrorKind::InvariantViolation
                }
                ValidationError::NotFound(_) => ErrorKind::NotFound,
                ValidationError::NotAFile(_) => ErrorKind::NotAFile,
                ValidationError::IsSymlink(_) => ErrorKind::IsSymlink,
                ValidationError::Io { .. } => ErrorKind::Io,
            },
            Self::Execute(e) => match e {
                ExecuteError::NotFound(_) => ErrorKind::NotFound,
                ExecuteError::MoveFailed { .. } | ExecuteError::DeleteFailed { .. } => {
                    ErrorKind::Io
                }
                ExecuteError::Store(e) => store_kind(e),
            },
            Self::HashParse(_) => ErrorKind::Other,
            Self::Signal(_) => ErrorKind::Other,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

fn store_kind(error: &StoreError) -> ErrorKind {
    match error {
        StoreError::Unavailable { .. } => ErrorKind::StoreUnavailable,
        StoreError::NotFound(_) => ErrorKind::NotFound,
        StoreError::Database(_) => ErrorKind::Io,
        StoreError::MissingHash(_) | StoreError::NonUtf8Path(_) | StoreError::CorruptHash { .. } => {
            ErrorKind::Other
        }
    }
}
