//! Split driver
//!
//! Streams an input through the block splitter into three shards and records
//! the resulting metadata.

use crate::crypto::{ContentHash, Fingerprinter, KeystreamCipher, Salt};
use crate::error::{IoContext, Result, StreamId};
use crate::metadata::Metadata;
use crate::stripe::{allocate_buffer, role_for, split_block, Role, Stripe};
use crate::{CHUNK_SIZE, SHARD_COUNT};
use std::io::{self, ErrorKind, Read, Write};
use tracing::{debug, trace};

/// Split `input` across three shards and persist the metadata record.
///
/// With a passphrase the input is encrypted with one continuous keystream
/// before it is split, under a freshly drawn salt. The returned fingerprint
/// covers the bytes actually split, i.e. the ciphertext when encrypting.
///
/// Nothing is written to `metadata` unless every block made it to the shards.
pub fn split<R, W, M>(
    input: &mut R,
    shards: &mut [W; SHARD_COUNT],
    metadata: &mut M,
    passphrase: Option<&[u8]>,
) -> Result<ContentHash>
where
    R: Read,
    W: Write,
    M: Write,
{
    let mut record = Metadata::new();
    let mut cipher = match passphrase {
        Some(passphrase) => {
            record.salt = Salt::generate()?;
            Some(KeystreamCipher::from_passphrase(passphrase, &record.salt)?)
        }
        None => None,
    };

    let mut chunk = allocate_buffer(CHUNK_SIZE)?;
    let mut stripe = Stripe::allocate()?;
    let mut input_fp = Fingerprinter::new();
    let mut shard_fps: [Fingerprinter; SHARD_COUNT] = Default::default();

    let mut block: u64 = 0;
    loop {
        let len = read_full(input, &mut chunk).on(StreamId::Input)?;
        if len == 0 {
            break;
        }
        let chunk = &mut chunk[..len];

        if let Some(cipher) = cipher.as_mut() {
            cipher.apply(chunk);
        }
        input_fp.update(chunk);

        split_block(chunk, &mut stripe);
        for role in Role::ALL {
            let fragment = stripe.fragment(role);
            if fragment.is_empty() {
                continue;
            }
            let shard = role_for(block, role);
            shards[shard]
                .write_all(fragment)
                .on(StreamId::Shard(shard))?;
            shard_fps[shard].update(fragment);
        }
        trace!(block, len, lens = ?stripe.lens(), "split block");

        block += 1;
    }

    for (index, shard) in shards.iter_mut().enumerate() {
        shard.flush().on(StreamId::Shard(index))?;
    }

    let sizes = shard_fps.each_ref().map(Fingerprinter::bytes_hashed);
    let max = sizes.iter().max().copied().unwrap_or(0);
    let min = sizes.iter().min().copied().unwrap_or(0);
    // Bounded by B: only the final block can leave a shard short
    record.missing = (max - min) as u32;

    for (hash, fp) in record.shard_hashes.iter_mut().zip(&shard_fps) {
        *hash = Some(fp.finalize());
    }
    let input_hash = input_fp.finalize();
    record.input_hash = Some(input_hash);

    record.write_to(metadata)?;

    debug!(
        blocks = block,
        bytes = input_fp.bytes_hashed(),
        ?sizes,
        missing = record.missing,
        encrypted = record.is_encrypted(),
        "split complete"
    );
    Ok(input_hash)
}

/// Fill `buf` from `reader`, stopping early only at end of stream
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TriShardError;
    use crate::{BLOCK_SIZE, METADATA_LEN};
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    fn run_split(data: &[u8], passphrase: Option<&[u8]>) -> ([Vec<u8>; 3], Metadata, ContentHash) {
        let mut shards: [Vec<u8>; 3] = Default::default();
        let mut meta = Vec::new();
        let hash = split(&mut Cursor::new(data), &mut shards, &mut meta, passphrase).unwrap();
        assert_eq!(meta.len(), METADATA_LEN);
        let record = Metadata::from_bytes(&meta).unwrap();
        (shards, record, hash)
    }

    /// Reader that fails after yielding some bytes
    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(ErrorKind::Other, "disk gone"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0xAB);
            self.remaining -= n;
            Ok(n)
        }
    }

    /// Reader that hands out one byte at a time and interrupts in between
    struct TrickleReader {
        data: Vec<u8>,
        pos: usize,
        interrupt: bool,
    }

    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn test_split_2500_bytes() {
        let data = pattern(2500);
        let (shards, record, hash) = run_split(&data, None);

        assert_eq!(shards[0].len(), 1024);
        assert_eq!(shards[1].len(), 1476);
        assert_eq!(shards[2].len(), 1476);
        assert_eq!(record.missing, 452);
        assert_eq!(hash, ContentHash::compute(&data));
        assert_eq!(record.input_hash, Some(hash));
        for (shard, recorded) in shards.iter().zip(&record.shard_hashes) {
            assert_eq!(*recorded, Some(ContentHash::compute(shard)));
        }

        // Block 0: parity on shard 0, primary on shard 1, secondary on shard 2
        assert_eq!(&shards[1][..BLOCK_SIZE], &data[..BLOCK_SIZE]);
        assert_eq!(&shards[2][..BLOCK_SIZE], &data[BLOCK_SIZE..2 * BLOCK_SIZE]);
        assert_eq!(shards[0][0], data[0] ^ data[BLOCK_SIZE]);
        // Block 1: parity on shard 1, primary on shard 2, secondary empty
        assert_eq!(&shards[2][BLOCK_SIZE..], &data[2 * BLOCK_SIZE..]);
        assert_eq!(shards[1][BLOCK_SIZE], !data[2 * BLOCK_SIZE]);
    }

    #[test]
    fn test_split_empty_input() {
        let (shards, record, hash) = run_split(&[], None);
        assert!(shards.iter().all(|s| s.is_empty()));
        assert_eq!(record.missing, 0);
        assert_eq!(hash, ContentHash::compute(&[]));
    }

    #[test]
    fn test_split_missing_tracks_final_block() {
        for (len, missing) in [
            (1, 1),
            (BLOCK_SIZE, BLOCK_SIZE as u32),
            (BLOCK_SIZE + 1, BLOCK_SIZE as u32 - 1),
            (CHUNK_SIZE, 0),
            (CHUNK_SIZE + 1, 1),
        ] {
            let (_, record, _) = run_split(&pattern(len), None);
            assert_eq!(record.missing, missing, "len {len}");
        }
    }

    #[test]
    fn test_split_encrypted() {
        let data = pattern(5000);
        let (shards, record, hash) = run_split(&data, Some(b"correct horse"));

        assert!(record.is_encrypted());
        assert_ne!(hash, ContentHash::compute(&data));
        // Data fragments hold ciphertext
        assert_ne!(&shards[1][..BLOCK_SIZE], &data[..BLOCK_SIZE]);

        let mut ciphertext = data.clone();
        KeystreamCipher::from_passphrase(b"correct horse", &record.salt)
            .unwrap()
            .apply(&mut ciphertext);
        assert_eq!(hash, ContentHash::compute(&ciphertext));
        assert_eq!(&shards[1][..BLOCK_SIZE], &ciphertext[..BLOCK_SIZE]);
    }

    #[test]
    fn test_split_fresh_salt_each_run() {
        let data = pattern(100);
        let (_, a, _) = run_split(&data, Some(b"pw"));
        let (_, b, _) = run_split(&data, Some(b"pw"));
        assert_ne!(a.salt, b.salt);
    }

    #[test]
    fn test_input_error_writes_no_metadata() {
        let mut shards: [Vec<u8>; 3] = Default::default();
        let mut meta = Vec::new();
        let mut input = FailingReader { remaining: 3000 };

        let err = split(&mut input, &mut shards, &mut meta, None).unwrap_err();
        assert!(matches!(
            err,
            TriShardError::Io {
                stream: StreamId::Input,
                ..
            }
        ));
        assert!(meta.is_empty());
    }

    #[test]
    fn test_read_full_retries_interrupts() {
        let data = pattern(CHUNK_SIZE + 10);
        let mut reader = TrickleReader {
            data: data.clone(),
            pos: 0,
            interrupt: false,
        };
        let mut buf = vec![0u8; CHUNK_SIZE];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), CHUNK_SIZE);
        assert_eq!(buf, &data[..CHUNK_SIZE]);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 10);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }
}
