//! Merge Command
//!
//! Rebuilds a file from any two shards of a set.

use crate::commands::{format_bytes, resolve_stem};
use crate::passphrase;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use trishard_core::{merge_files, ShardSet};

/// Merge configuration
pub struct MergeConfig {
    pub stem: String,
    pub dir: PathBuf,
    pub output: PathBuf,
    pub passphrase_env: Option<String>,
}

/// Run merge command
pub fn run(config: MergeConfig) -> Result<()> {
    let shard_set = ShardSet::new(&config.dir, resolve_stem(&config.stem));
    let metadata = shard_set
        .read_metadata()
        .with_context(|| format!("Failed to read metadata for {}", shard_set.stem()))?;

    let passphrase = if metadata.is_encrypted() {
        Some(passphrase::read(config.passphrase_env.as_deref(), false)?)
    } else {
        None
    };

    let report = merge_files(
        &shard_set,
        &config.output,
        passphrase.as_deref().map(str::as_bytes),
    )
    .with_context(|| format!("Failed to merge {}", shard_set.stem()))?;

    if let Some(dead) = report.dead_shard {
        println!(
            "{} Shard {} is missing or corrupted, rebuilt from the other two",
            style(symbols::WARN).yellow(),
            dead
        );
    }
    if report.inconsistent_blocks > 0 {
        println!(
            "{} {} block(s) had inconsistent parity",
            style(symbols::WARN).yellow(),
            report.inconsistent_blocks
        );
    }
    println!(
        "{} Wrote {} to {}",
        style(symbols::CHECK).green(),
        format_bytes(report.bytes_written),
        style(config.output.display()).bold()
    );

    Ok(())
}
