//! Merge driver
//!
//! Rebuilds the original input from any two shards of a set. The dead shard
//! is inferred once up front by comparing freshly computed fingerprints with
//! the persisted metadata, and is never read afterwards.

use crate::crypto::{Fingerprinter, KeystreamCipher};
use crate::error::{IoContext, Result, StreamId, TriShardError};
use crate::metadata::{infer_dead_shard, Diagnosis, Metadata};
use crate::split::read_full;
use crate::stripe::{
    allocate_buffer, merge_block_checked, parity_shard, role_for, verify_parity, Role, Stripe,
};
use crate::{CHUNK_SIZE, MIN_SHARDS, SHARD_COUNT};
use serde::Serialize;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use tracing::{debug, trace, warn};

/// Summary of a completed merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Bytes written to the output
    pub bytes_written: u64,
    /// Shard ignored during reconstruction
    pub dead_shard: Option<usize>,
    /// Blocks whose parity disagreed with the data fragments
    pub inconsistent_blocks: u64,
}

/// Infer the health of a shard set without rebuilding it
pub fn diagnose<R, M>(shards: &mut [Option<R>; SHARD_COUNT], metadata: &mut M) -> Result<Diagnosis>
where
    R: Read + Seek,
    M: Read,
{
    let persisted = Metadata::read_from(metadata)?;
    diagnose_against(&persisted, shards)
}

fn diagnose_against<R: Read + Seek>(
    persisted: &Metadata,
    shards: &mut [Option<R>; SHARD_COUNT],
) -> Result<Diagnosis> {
    let available = shards.iter().filter(|s| s.is_some()).count();
    if available < MIN_SHARDS {
        return Err(TriShardError::TooFewShards {
            available,
            required: MIN_SHARDS,
        });
    }
    let scan = Metadata::derive_from_shards(shards)?;
    infer_dead_shard(persisted, &scan)
}

/// Rebuild the input of a shard set into `output`.
///
/// Absent shards are passed as `None`. A passphrase is required when the
/// metadata records a salt and is ignored otherwise. The reconstructed stream
/// is checked against the recorded input fingerprint before it is decrypted;
/// bytes already written stay in `output` when that check fails.
pub fn merge<R, M, W>(
    mut shards: [Option<R>; SHARD_COUNT],
    metadata: &mut M,
    passphrase: Option<&[u8]>,
    output: &mut W,
) -> Result<MergeReport>
where
    R: Read + Seek,
    M: Read,
    W: Write,
{
    let persisted = Metadata::read_from(metadata)?;

    let mut cipher = match (persisted.is_encrypted(), passphrase) {
        (true, Some(passphrase)) => Some(KeystreamCipher::from_passphrase(
            passphrase,
            &persisted.salt,
        )?),
        (true, None) => return Err(TriShardError::PassphraseRequired),
        (false, Some(_)) => {
            warn!("shard set is not encrypted, ignoring passphrase");
            None
        }
        (false, None) => None,
    };

    let diagnosis = diagnose_against(&persisted, &mut shards)?;
    debug!(
        dead_shard = ?diagnosis.dead_shard,
        missing = persisted.missing,
        encrypted = persisted.is_encrypted(),
        "starting merge"
    );

    let mut readers: [Option<BufReader<R>>; SHARD_COUNT] = Default::default();
    for (index, shard) in shards.into_iter().enumerate() {
        if Some(index) == diagnosis.dead_shard {
            continue;
        }
        if let Some(mut stream) = shard {
            stream.seek(SeekFrom::Start(0)).on(StreamId::Shard(index))?;
            readers[index] = Some(BufReader::new(stream));
        }
    }

    let mut stripe = Stripe::allocate()?;
    let mut out = allocate_buffer(CHUNK_SIZE)?;
    let mut input_fp = Fingerprinter::new();
    let mut report = MergeReport {
        bytes_written: 0,
        dead_shard: diagnosis.dead_shard,
        inconsistent_blocks: 0,
    };

    let mut block: u64 = 0;
    loop {
        stripe.clear();
        for role in Role::ALL {
            let shard = role_for(block, role);
            if let Some(reader) = readers[shard].as_mut() {
                let n = read_full(reader, stripe.slot_mut(role)).on(StreamId::Shard(shard))?;
                stripe.set_len(role, n);
            }
        }
        if stripe.is_empty() {
            break;
        }

        let final_block = is_final_block(&mut readers, block)?;
        let missing = if final_block {
            persisted.missing as usize
        } else {
            0
        };

        let parity = parity_shard(block);
        let dead = match diagnosis.dead_shard {
            Some(dead) => dead,
            None => {
                if !verify_parity(&stripe) {
                    warn!(block, parity, "parity does not match data fragments");
                    report.inconsistent_blocks += 1;
                }
                parity
            }
        };

        let len = merge_block_checked(&stripe, block, dead, missing, &mut out)?;
        let chunk = &mut out[..len];
        input_fp.update(chunk);
        if let Some(cipher) = cipher.as_mut() {
            cipher.apply(chunk);
        }
        output.write_all(chunk).on(StreamId::Output)?;
        report.bytes_written += len as u64;
        trace!(block, len, final_block, "merged block");

        block += 1;
    }
    output.flush().on(StreamId::Output)?;

    if persisted.input_hash != Some(input_fp.finalize()) {
        return Err(TriShardError::InputFingerprintMismatch);
    }

    debug!(
        blocks = block,
        bytes = report.bytes_written,
        inconsistent_blocks = report.inconsistent_blocks,
        "merge complete"
    );
    Ok(report)
}

/// A block is the last one when a surviving data-role shard has nothing left.
///
/// Both data-role shards of block n carry bytes for block n+1 whenever it
/// exists, so one look ahead on either decides the question.
fn is_final_block<R: Read>(
    readers: &mut [Option<BufReader<R>>; SHARD_COUNT],
    block: u64,
) -> Result<bool> {
    for role in [Role::Primary, Role::Secondary] {
        let shard = role_for(block, role);
        if let Some(reader) = readers[shard].as_mut() {
            if at_end(reader).on(StreamId::Shard(shard))? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn at_end<R: Read>(reader: &mut BufReader<R>) -> std::io::Result<bool> {
    loop {
        match reader.fill_buf() {
            Ok(buf) => return Ok(buf.is_empty()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
