//! TriShard Core Library
//!
//! Three-shard rotating-parity erasure coding.
//! This crate provides:
//! - Block splitting into primary, secondary and parity fragments (RAID5 style)
//! - Reconstruction from any two of the three shards
//! - A fixed-width metadata record with dead-shard inference
//! - Optional whole-file encryption (HMAC-SHA256 key derivation, AES-256-CTR)
//! - Blake3 fingerprints for every shard and the whole input

pub mod crypto;
pub mod error;
pub mod layout;
pub mod merge;
pub mod metadata;
pub mod split;
pub mod stripe;

pub use crypto::{ContentHash, DerivedKey, Fingerprinter, KeystreamCipher, Salt};
pub use error::{Result, StreamId, TriShardError};
pub use layout::{merge_files, split_file, stem_for, ShardSet, SplitOutcome};
pub use merge::{diagnose, merge, MergeReport};
pub use metadata::{compare, infer_dead_shard, Diagnosis, Metadata, Mismatch, ShardHealth};
pub use split::split;
pub use stripe::{merge_block, parity_shard, role_for, split_block, Role, Stripe};

/// Fragment size B. Every block carries up to 2·B bytes of input.
pub const BLOCK_SIZE: usize = 1024;

/// Number of physical shards in a set
pub const SHARD_COUNT: usize = 3;

/// Largest chunk consumed per block
pub const CHUNK_SIZE: usize = 2 * BLOCK_SIZE;

/// Working buffer holding all three fragments of a block
pub const STRIPE_SIZE: usize = SHARD_COUNT * BLOCK_SIZE;

/// Minimum number of shards needed to rebuild the input
pub const MIN_SHARDS: usize = SHARD_COUNT - 1;

/// Salt length in bytes
pub const SALT_SIZE: usize = 256;

/// Derived key length in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Hex length of a Blake3 fingerprint
pub const HASH_HEX_LEN: usize = 64;

/// Current metadata format version
pub const METADATA_VERSION: u8 = 1;

/// Persisted metadata size: version, four fingerprints, salt, padding
pub const METADATA_LEN: usize = 2 + 4 * HASH_HEX_LEN + SALT_SIZE + 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(CHUNK_SIZE, 2048);
        assert_eq!(STRIPE_SIZE, 3072);
        assert_eq!(METADATA_LEN, 518);
    }
}
