//! On-disk shard sets
//!
//! A shard set lives in one directory under a stem derived from the input's
//! file name: `<stem>.0`, `<stem>.1`, `<stem>.2` hold the shards and
//! `<stem>.m` the metadata record.

use crate::crypto::ContentHash;
use crate::error::{IoContext, Result, StreamId, TriShardError};
use crate::merge::{diagnose, merge, MergeReport};
use crate::metadata::{Diagnosis, Metadata};
use crate::split::split;
use crate::{METADATA_LEN, MIN_SHARDS, SHARD_COUNT};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const METADATA_EXTENSION: &str = "m";
const PARTIAL_EXTENSION: &str = "partial";

/// Stem for an input file name: the hex fingerprint of the name itself
pub fn stem_for(name: &str) -> String {
    ContentHash::compute(name.as_bytes()).to_hex()
}

/// Paths of one shard set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSet {
    dir: PathBuf,
    stem: String,
}

impl ShardSet {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    /// Shard set for an input file name
    pub fn for_name(dir: impl Into<PathBuf>, name: &str) -> Self {
        Self::new(dir, stem_for(name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn shard_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, index))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, METADATA_EXTENSION))
    }

    /// Size of the metadata record on disk
    pub const fn metadata_len() -> usize {
        METADATA_LEN
    }

    /// Indices of the shards that exist on disk
    pub fn available_shards(&self) -> Vec<usize> {
        (0..SHARD_COUNT)
            .filter(|&i| self.shard_path(i).is_file())
            .collect()
    }

    /// Load the persisted metadata record
    pub fn read_metadata(&self) -> Result<Metadata> {
        Metadata::read_from(&mut self.open_metadata()?)
    }

    /// Infer the health of the set from the files on disk
    pub fn diagnose(&self) -> Result<Diagnosis> {
        let mut shards = self.open_shards()?;
        diagnose(&mut shards, &mut self.open_metadata()?)
    }

    /// Open every shard that exists; absent files become `None`
    fn open_shards(&self) -> Result<[Option<File>; SHARD_COUNT]> {
        let mut shards: [Option<File>; SHARD_COUNT] = Default::default();
        for (index, slot) in shards.iter_mut().enumerate() {
            match File::open(self.shard_path(index)) {
                Ok(file) => *slot = Some(file),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(shard = index, "shard file not found");
                }
                Err(e) => return Err(e).on(StreamId::Shard(index)),
            }
        }
        Ok(shards)
    }

    fn open_metadata(&self) -> Result<BufReader<File>> {
        let file = File::open(self.metadata_path()).on(StreamId::Metadata)?;
        Ok(BufReader::new(file))
    }

    fn create_shard(&self, index: usize) -> Result<BufWriter<File>> {
        let file = File::create(self.shard_path(index)).on(StreamId::Shard(index))?;
        Ok(BufWriter::new(file))
    }
}

/// Result of splitting a file to disk
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub stem: String,
    /// Fingerprint of the bytes that were split (ciphertext when encrypted)
    pub input_hash: ContentHash,
    pub shard_set: ShardSet,
}

/// Split the file at `input_path` into a shard set under `dir`.
///
/// The directory is created when needed; existing files of the same stem are
/// overwritten.
pub fn split_file(
    input_path: &Path,
    dir: &Path,
    passphrase: Option<&[u8]>,
) -> Result<SplitOutcome> {
    let name = input_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} has no usable file name", input_path.display()),
            )
        })
        .on(StreamId::Input)?;
    let shard_set = ShardSet::for_name(dir, name);

    let mut input = BufReader::new(File::open(input_path).on(StreamId::Input)?);
    fs::create_dir_all(dir).on(StreamId::Metadata)?;

    let mut shards = [
        shard_set.create_shard(0)?,
        shard_set.create_shard(1)?,
        shard_set.create_shard(2)?,
    ];
    let mut metadata =
        BufWriter::new(File::create(shard_set.metadata_path()).on(StreamId::Metadata)?);

    let input_hash = split(&mut input, &mut shards, &mut metadata, passphrase)?;
    info!(
        input = %input_path.display(),
        stem = %shard_set.stem(),
        "split file into shard set"
    );

    Ok(SplitOutcome {
        stem: shard_set.stem().to_string(),
        input_hash,
        shard_set,
    })
}

/// Rebuild a shard set into the file at `output_path`.
///
/// At least two shards and the metadata must exist. The data is written to a
/// partial file next to `output_path` and renamed over it only once the merge
/// succeeds, so a failed merge leaves any existing file untouched.
pub fn merge_files(
    shard_set: &ShardSet,
    output_path: &Path,
    passphrase: Option<&[u8]>,
) -> Result<MergeReport> {
    let shards = shard_set.open_shards()?;
    let available = shards.iter().flatten().count();
    if available < MIN_SHARDS {
        return Err(TriShardError::TooFewShards {
            available,
            required: MIN_SHARDS,
        });
    }
    let mut metadata = shard_set.open_metadata()?;

    let partial_path = partial_path_for(output_path);
    let result = merge_into(shards, &mut metadata, passphrase, &partial_path);
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&partial_path) {
                debug!(path = %partial_path.display(), error = %cleanup, "partial output not removed");
            }
            return Err(e);
        }
    };
    fs::rename(&partial_path, output_path).on(StreamId::Output)?;

    info!(
        stem = %shard_set.stem(),
        output = %output_path.display(),
        bytes = report.bytes_written,
        dead_shard = ?report.dead_shard,
        "merged shard set"
    );
    Ok(report)
}

fn merge_into(
    shards: [Option<File>; SHARD_COUNT],
    metadata: &mut BufReader<File>,
    passphrase: Option<&[u8]>,
    partial_path: &Path,
) -> Result<MergeReport> {
    let mut output = BufWriter::new(File::create(partial_path).on(StreamId::Output)?);
    let report = merge(shards, metadata, passphrase, &mut output)?;
    output
        .into_inner()
        .map_err(|e| e.into_error())
        .and_then(|file| file.sync_all())
        .on(StreamId::Output)?;
    Ok(report)
}

/// Sibling of `output_path` that holds the data until the merge completes
fn partial_path_for(output_path: &Path) -> PathBuf {
    let name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_path.with_file_name(format!(".{}.{}", name, PARTIAL_EXTENSION))
}
