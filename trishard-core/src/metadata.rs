//! Shard set metadata
//!
//! One fixed-width record is written next to every shard set. It carries the
//! fingerprint of each shard and of the whole input, the salt used for key
//! derivation and the tail padding of the final block. At merge time a second
//! record is derived from whatever shards are readable and compared against
//! the persisted one to find the dead shard.
//!
//! Persisted layout (no delimiters):
//!
//! ```text
//! version  2 hex chars
//! shard 0  64 hex chars
//! shard 1  64 hex chars
//! shard 2  64 hex chars
//! input    64 hex chars
//! salt     256 raw bytes
//! missing  4 hex chars
//! ```

use crate::crypto::{ContentHash, Salt};
use crate::error::{IoContext, Result, StreamId, TriShardError};
use crate::{BLOCK_SIZE, HASH_HEX_LEN, METADATA_LEN, METADATA_VERSION, SALT_SIZE, SHARD_COUNT};
use serde::Serialize;
use std::fmt;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::{BitOr, BitOrAssign};
use tracing::debug;

const VERSION_LEN: usize = 2;
const MISSING_LEN: usize = 4;

/// Metadata record for one shard set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Format version tag
    pub version: u8,
    /// Fingerprint of each physical shard; `None` when unknown or unreadable
    pub shard_hashes: [Option<ContentHash>; SHARD_COUNT],
    /// Fingerprint of the whole (possibly encrypted) input stream
    pub input_hash: Option<ContentHash>,
    /// Key derivation salt, all-zero when the shard set is not encrypted
    pub salt: Salt,
    /// Longest minus shortest shard length
    pub missing: u32,
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

impl Metadata {
    /// Empty record tagged with the current format version
    pub fn new() -> Self {
        Self {
            version: METADATA_VERSION,
            shard_hashes: [None; SHARD_COUNT],
            input_hash: None,
            salt: Salt::empty(),
            missing: 0,
        }
    }

    /// Whether the shard set was encrypted at split time
    pub fn is_encrypted(&self) -> bool {
        !self.salt.is_empty()
    }

    /// Encode into the fixed-width persisted layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(METADATA_LEN);
        out.extend_from_slice(format!("{:02x}", self.version).as_bytes());
        for hash in self.shard_hashes.iter().chain(std::iter::once(&self.input_hash)) {
            out.extend_from_slice(hash_field(hash).as_bytes());
        }
        out.extend_from_slice(self.salt.as_bytes());
        out.extend_from_slice(format!("{:04x}", self.missing).as_bytes());
        debug_assert_eq!(out.len(), METADATA_LEN);
        out
    }

    /// Decode the fixed-width persisted layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != METADATA_LEN {
            return Err(TriShardError::MalformedMetadata(format!(
                "record must be {} bytes, got {}",
                METADATA_LEN,
                bytes.len()
            )));
        }

        let version = parse_hex_field(&bytes[..VERSION_LEN], "version")? as u8;
        if version != METADATA_VERSION {
            return Err(TriShardError::VersionMismatch {
                expected: METADATA_VERSION,
                found: version,
            });
        }

        let mut offset = VERSION_LEN;
        let mut hashes = [None; SHARD_COUNT + 1];
        for hash in hashes.iter_mut() {
            *hash = parse_hash_field(&bytes[offset..offset + HASH_HEX_LEN])?;
            offset += HASH_HEX_LEN;
        }

        let salt = Salt::from_slice(&bytes[offset..offset + SALT_SIZE])?;
        offset += SALT_SIZE;

        let missing = parse_hex_field(&bytes[offset..offset + MISSING_LEN], "missing")?;
        if missing as usize > BLOCK_SIZE {
            return Err(TriShardError::MalformedMetadata(format!(
                "tail padding {} exceeds block size {}",
                missing, BLOCK_SIZE
            )));
        }

        Ok(Self {
            version,
            shard_hashes: [hashes[0], hashes[1], hashes[2]],
            input_hash: hashes[3],
            salt,
            missing,
        })
    }

    /// Persist the record
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()).on(StreamId::Metadata)?;
        writer.flush().on(StreamId::Metadata)
    }

    /// Load a persisted record
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = vec![0u8; METADATA_LEN];
        reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                TriShardError::MalformedMetadata("record is truncated".to_string())
            }
            _ => TriShardError::Io {
                stream: StreamId::Metadata,
                source: e,
            },
        })?;
        Self::from_bytes(&bytes)
    }

    /// Fingerprint every shard that is present.
    ///
    /// Absent shards keep a `None` fingerprint. Each stream is hashed from its
    /// start and left at the position it had on entry.
    pub fn derive_from_shards<R: Read + Seek>(
        shards: &mut [Option<R>; SHARD_COUNT],
    ) -> Result<ShardScan> {
        let mut metadata = Metadata::new();
        let mut lens = [None; SHARD_COUNT];

        for (index, shard) in shards.iter_mut().enumerate() {
            let Some(stream) = shard.as_mut() else {
                debug!(shard = index, "shard absent, skipping fingerprint");
                continue;
            };
            let stream_id = StreamId::Shard(index);
            let position = stream.stream_position().on(stream_id)?;
            stream.seek(SeekFrom::Start(0)).on(stream_id)?;
            let (hash, len) = ContentHash::compute_reader(stream).on(stream_id)?;
            stream.seek(SeekFrom::Start(position)).on(stream_id)?;

            metadata.shard_hashes[index] = Some(hash);
            lens[index] = Some(len);
        }

        let present = lens.iter().flatten();
        let max = present.clone().max().copied().unwrap_or(0);
        let min = present.min().copied().unwrap_or(0);
        metadata.missing = u32::try_from(max - min).unwrap_or(u32::MAX);

        Ok(ShardScan { metadata, lens })
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version: {:02x}", self.version)?;
        writeln!(f, "Missing: {}", self.missing)?;
        for (index, hash) in self.shard_hashes.iter().enumerate() {
            writeln!(f, "{}: {}", index, hash_field(hash))?;
        }
        writeln!(f, "I: {}", hash_field(&self.input_hash))?;
        if self.is_encrypted() {
            write!(f, "S: {}", self.salt.to_hex())
        } else {
            write!(f, "S: (not encrypted)")
        }
    }
}

fn hash_field(hash: &Option<ContentHash>) -> String {
    match hash {
        Some(hash) => hash.to_hex(),
        None => "0".repeat(HASH_HEX_LEN),
    }
}

fn parse_hash_field(field: &[u8]) -> Result<Option<ContentHash>> {
    if field.iter().all(|&b| b == b'0') {
        return Ok(None);
    }
    let hex = std::str::from_utf8(field)
        .map_err(|_| TriShardError::MalformedMetadata("fingerprint is not ASCII".to_string()))?;
    ContentHash::from_hex(hex).map(Some)
}

fn parse_hex_field(field: &[u8], name: &str) -> Result<u32> {
    std::str::from_utf8(field)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| TriShardError::MalformedMetadata(format!("{} field is not hex", name)))
}

/// Fingerprints recomputed from the shards currently on hand
#[derive(Debug, Clone)]
pub struct ShardScan {
    /// Hash-only record; never persisted
    pub metadata: Metadata,
    /// Length of each present shard
    pub lens: [Option<u64>; SHARD_COUNT],
}

impl ShardScan {
    /// Number of shards that could be read
    pub fn present(&self) -> usize {
        self.lens.iter().flatten().count()
    }
}

/// Per-field mismatch flags produced by [`compare`]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Mismatch(u8);

impl Mismatch {
    pub const NONE: Mismatch = Mismatch(0x00);
    pub const SHARD0: Mismatch = Mismatch(0x01);
    pub const SHARD1: Mismatch = Mismatch(0x02);
    pub const SHARD2: Mismatch = Mismatch(0x04);
    pub const INPUT: Mismatch = Mismatch(0x08);
    pub const VERSION: Mismatch = Mismatch(0x10);
    pub const MISSING: Mismatch = Mismatch(0x20);

    /// Flag for a shard index
    pub fn shard(index: usize) -> Mismatch {
        match index {
            0 => Self::SHARD0,
            1 => Self::SHARD1,
            2 => Self::SHARD2,
            _ => Self::NONE,
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Mismatch) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Indices of the shards whose fingerprints disagree
    pub fn shards(self) -> Vec<usize> {
        (0..SHARD_COUNT)
            .filter(|&i| self.contains(Self::shard(i)))
            .collect()
    }
}

impl BitOr for Mismatch {
    type Output = Mismatch;

    fn bitor(self, rhs: Mismatch) -> Mismatch {
        Mismatch(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mismatch {
    fn bitor_assign(&mut self, rhs: Mismatch) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::SHARD0, "SHARD0"),
            (Self::SHARD1, "SHARD1"),
            (Self::SHARD2, "SHARD2"),
            (Self::INPUT, "INPUT"),
            (Self::VERSION, "VERSION"),
            (Self::MISSING, "MISSING"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Mismatch({})", set.join(" | "))
    }
}

/// Compare two records field by field.
///
/// A fingerprint counts as a miss when the two differ or when either side
/// has none.
pub fn compare(a: &Metadata, b: &Metadata) -> Mismatch {
    let mut mismatch = Mismatch::NONE;
    if a.version != b.version {
        mismatch |= Mismatch::VERSION;
    }
    if a.missing != b.missing {
        mismatch |= Mismatch::MISSING;
    }
    for index in 0..SHARD_COUNT {
        if !hashes_match(&a.shard_hashes[index], &b.shard_hashes[index]) {
            mismatch |= Mismatch::shard(index);
        }
    }
    if !hashes_match(&a.input_hash, &b.input_hash) {
        mismatch |= Mismatch::INPUT;
    }
    mismatch
}

fn hashes_match(a: &Option<ContentHash>, b: &Option<ContentHash>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// State of a shard set relative to its metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShardHealth {
    /// All three shards match their fingerprints
    Healthy,
    /// One shard is missing or corrupted; the other two can rebuild the data
    Degraded { dead_shard: usize },
}

/// Outcome of dead-shard inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnosis {
    /// Shard to ignore during merge, `None` when every shard checks out
    pub dead_shard: Option<usize>,
    /// Raw comparison between the persisted and the derived record
    pub mismatch: Mismatch,
}

impl Diagnosis {
    pub fn health(&self) -> ShardHealth {
        match self.dead_shard {
            None => ShardHealth::Healthy,
            Some(dead_shard) => ShardHealth::Degraded { dead_shard },
        }
    }
}

/// Work out which shard, if any, cannot be trusted.
///
/// Exactly one disagreeing shard fingerprint names the dead shard. Two or
/// more cannot be repaired by a single parity. The recorded tail padding must
/// also agree with the surviving shard lengths: they either match or differ
/// by exactly the padding.
pub fn infer_dead_shard(persisted: &Metadata, scan: &ShardScan) -> Result<Diagnosis> {
    let mismatch = compare(persisted, &scan.metadata);
    if mismatch.contains(Mismatch::VERSION) {
        return Err(TriShardError::VersionMismatch {
            expected: persisted.version,
            found: scan.metadata.version,
        });
    }

    let divergent = mismatch.shards();
    let dead_shard = match divergent.as_slice() {
        [] => None,
        [dead] => Some(*dead),
        _ => return Err(TriShardError::DivergentShards { shards: divergent }),
    };

    let surviving: Vec<u64> = (0..SHARD_COUNT)
        .filter(|&i| Some(i) != dead_shard)
        .filter_map(|i| scan.lens[i])
        .collect();
    let spread = match (surviving.iter().max(), surviving.iter().min()) {
        (Some(max), Some(min)) => max - min,
        _ => 0,
    };
    let padding_ok = match dead_shard {
        None => spread == u64::from(persisted.missing),
        Some(_) => spread == 0 || spread == u64::from(persisted.missing),
    };
    if !padding_ok {
        return Err(TriShardError::PaddingMismatch {
            expected: persisted.missing,
            actual: spread,
        });
    }

    debug!(?dead_shard, ?mismatch, "dead shard inference");
    Ok(Diagnosis {
        dead_shard,
        mismatch,
    })
}
