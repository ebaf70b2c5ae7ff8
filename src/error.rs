//! Error types for mptrie

use crate::model::Hash;
use thiserror::Error;

/// Result type alias for mptrie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mptrie operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key too long: {len} nibbles, limit is {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("Value too long: {len} bytes, limit is {max}")]
    ValueTooLong { len: usize, max: usize },

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Node {0} is missing from the backing store")]
    MissingNode(Hash),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

impl Error {
    /// Whether this error reports a broken node graph rather than bad input.
    ///
    /// Fatal errors are never retried: the backing store is missing data the
    /// trie needs, or holds bytes that do not decode to the node they claim
    /// to be.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MissingNode(_) | Error::Corruption(_))
    }

    /// Whether this error was raised by argument validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidKey(_) | Error::KeyTooLong { .. } | Error::ValueTooLong { .. }
        )
    }
}
