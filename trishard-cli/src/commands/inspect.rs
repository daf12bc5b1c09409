//! Inspect Command
//!
//! Prints the metadata record of a shard set.

use crate::commands::{format_bytes, resolve_stem};
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use trishard_core::{ShardSet, SHARD_COUNT};

/// Inspect configuration
pub struct InspectConfig {
    pub stem: String,
    pub dir: PathBuf,
    pub json: bool,
}

/// Run inspect command
pub fn run(config: InspectConfig) -> Result<()> {
    let shard_set = ShardSet::new(&config.dir, resolve_stem(&config.stem));
    let metadata = shard_set
        .read_metadata()
        .with_context(|| format!("Failed to read metadata for {}", shard_set.stem()))?;

    if config.json {
        let json = serde_json::to_string_pretty(&metadata).context("Failed to encode metadata")?;
        println!("{}", json);
        return Ok(());
    }

    println!("{}", style(format!("Shard set {}", shard_set.stem())).bold());
    println!("{}", symbols::HLINE_SHORT);
    println!("{}", metadata);
    println!();

    for index in 0..SHARD_COUNT {
        let path = shard_set.shard_path(index);
        match std::fs::metadata(&path) {
            Ok(meta) => println!(
                "  shard {}: {} ({})",
                index,
                path.display(),
                format_bytes(meta.len())
            ),
            Err(_) => println!(
                "  shard {}: {}",
                index,
                style("missing").red()
            ),
        }
    }

    Ok(())
}
