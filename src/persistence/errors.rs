//! # Persistence Errors

use std::io;
use std::path::Path;

use thiserror::Error;

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Failure on the document's read or write path.
///
/// Cloneable by design: a read failure terminates the broadcast slot and
/// must fan out to every observer, so I/O sources are flattened to their
/// kind and message instead of being carried as `io::Error`.
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    /// Filesystem failure on the given path.
    #[error("I/O failure on {path}: {message}")]
    Io {
        path: String,
        kind: io::ErrorKind,
        message: String,
    },

    /// The parent of the target path exists but is not a directory.
    #[error("{0} exists but is not a directory")]
    NotADirectory(String),

    /// Renaming the scratch file over the target failed. The usual cause
    /// is a second store instance writing to the same file.
    #[error("failed to commit {path}: {message}; is another store instance active on the same file?")]
    RenameConflict { path: String, message: String },

    /// The decoder reported unintelligible content.
    #[error("corrupted document at {path}: {message}")]
    Corruption {
        path: String,
        message: String,
        /// Set when the corruption handler produced a replacement value
        /// but persisting it failed too.
        #[source]
        recovery_failure: Option<Box<PersistError>>,
    },
}

impl PersistError {
    /// Flatten an `io::Error` against a path.
    pub fn io(path: &Path, err: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Corruption report against a path.
    pub fn corruption(path: &Path, message: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.display().to_string(),
            message: message.into(),
            recovery_failure: None,
        }
    }

    /// Whether this is a corruption report.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}
