//! Error types for TriShard
//!
//! Provides a unified error type for split, merge and metadata handling.

use std::fmt;
use thiserror::Error;

/// Result type alias for TriShard operations
pub type Result<T> = std::result::Result<T, TriShardError>;

/// Identifies which stream an I/O failure happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    /// The plaintext input of a split
    Input,
    /// One of the three physical shards
    Shard(usize),
    /// The persisted metadata record
    Metadata,
    /// The reconstructed output of a merge
    Output,
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamId::Input => write!(f, "input"),
            StreamId::Shard(index) => write!(f, "shard {}", index),
            StreamId::Metadata => write!(f, "metadata"),
            StreamId::Output => write!(f, "output"),
        }
    }
}

/// Unified error type for TriShard
#[derive(Error, Debug)]
pub enum TriShardError {
    // ===== Resource Errors =====
    #[error("Cannot allocate {bytes} byte working buffer")]
    OutOfMemory { bytes: usize },

    // ===== I/O Errors =====
    #[error("I/O error on {stream}: {source}")]
    Io {
        stream: StreamId,
        #[source]
        source: std::io::Error,
    },

    #[error("Too few shards available: have {available}, need {required}")]
    TooFewShards { available: usize, required: usize },

    // ===== Metadata Errors =====
    #[error("Metadata version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("Malformed metadata record: {0}")]
    MalformedMetadata(String),

    #[error("Shards {shards:?} disagree with the metadata; at most one shard can be recovered")]
    DivergentShards { shards: Vec<usize> },

    #[error("Tail padding mismatch: metadata records {expected}, surviving shards differ by {actual}")]
    PaddingMismatch { expected: u32, actual: u64 },

    #[error("Reconstructed data does not match the recorded input fingerprint")]
    InputFingerprintMismatch,

    // ===== Reconstruction Errors =====
    #[error("Cannot reconstruct block {block}: dead shard {dead} with parity on shard {parity}")]
    Reconstruction {
        block: u64,
        dead: usize,
        parity: usize,
    },

    // ===== Cryptography Errors =====
    #[error("Shard set is encrypted but no passphrase was given")]
    PassphraseRequired,

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Entropy source error: {0}")]
    Entropy(String),
}

impl TriShardError {
    /// True for errors caused by the metadata record or its comparison
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            TriShardError::VersionMismatch { .. }
                | TriShardError::MalformedMetadata(_)
                | TriShardError::DivergentShards { .. }
                | TriShardError::PaddingMismatch { .. }
                | TriShardError::InputFingerprintMismatch
        )
    }
}

impl From<rand::Error> for TriShardError {
    fn from(err: rand::Error) -> Self {
        TriShardError::Entropy(err.to_string())
    }
}

/// Attaches the failing stream to an I/O result
pub trait IoContext<T> {
    fn on(self, stream: StreamId) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn on(self, stream: StreamId) -> Result<T> {
        self.map_err(|source| TriShardError::Io { stream, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TriShardError::TooFewShards {
            available: 1,
            required: 2,
        };
        assert_eq!(err.to_string(), "Too few shards available: have 1, need 2");

        let err = TriShardError::DivergentShards { shards: vec![0, 2] };
        assert!(err.to_string().contains("[0, 2]"));
        assert!(err.is_metadata_error());
    }

    #[test]
    fn test_io_context_names_stream() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let result: std::io::Result<()> = Err(io_err);
        let err = result.on(StreamId::Shard(2)).unwrap_err();

        assert!(matches!(
            err,
            TriShardError::Io {
                stream: StreamId::Shard(2),
                ..
            }
        ));
        assert_eq!(err.to_string(), "I/O error on shard 2: file not found");
        assert!(!err.is_metadata_error());
    }
}
