//! Centralized error types for mboxindex.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxindex library.
#[derive(Error, Debug)]
pub enum MboxError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// A rewind asked for more bytes than have been consumed from the stream.
    #[error("Cannot rewind {requested} bytes: only {available} bytes consumed")]
    RewindOutOfRange { requested: u64, available: u64 },

    /// A `Date:` header value did not match the supported format.
    #[error("Unparseable date: '{value}'")]
    InvalidDate { value: String },

    /// A contact could not be created (empty display name or address).
    #[error("Invalid contact: {0}")]
    InvalidContact(String),

    /// A mailbox could not be created.
    #[error("Invalid mailbox: {0}")]
    InvalidMailBox(String),

    /// A folder could not be attached to a mailbox tree.
    #[error("Invalid folder: {0}")]
    InvalidFolder(String),

    /// The mailbox owning a message has been dropped.
    #[error("Message is no longer attached to a mailbox")]
    Detached,
}

/// Convenience alias for `Result<T, MboxError>`.
pub type Result<T> = std::result::Result<T, MboxError>;

impl MboxError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an open/metadata failure, turning `NotFound` into [`MboxError::FileNotFound`].
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}
