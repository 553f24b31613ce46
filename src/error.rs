use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JournalError>;

/// Kind of binary payload attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Photo,
    Attachment,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::Photo => write!(f, "photo"),
            BlobKind::Attachment => write!(f, "attachment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("i/o error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to initialize journal store: {0}")]
    StorageInit(#[source] rusqlite::Error),

    #[error("failed to write journal entry: {0}")]
    StorageWrite(#[source] rusqlite::Error),

    #[error("failed to read journal store: {0}")]
    StorageRead(#[source] rusqlite::Error),

    #[error("encryption failed")]
    Encryption,

    #[error("Invalid key or corrupted data: entry cannot be decrypted")]
    Decryption,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("OS random generator unavailable")]
    RandomUnavailable,

    #[error("{kind} of {size} bytes exceeds the {limit} byte limit")]
    BlobTooLarge {
        kind: BlobKind,
        size: usize,
        limit: usize,
    },

    #[error("stored date '{0}' is not a valid calendar date")]
    InvalidDate(String),
}

impl JournalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        JournalError::Io {
            path: path.into(),
            source,
        }
    }
}
