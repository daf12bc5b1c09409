//! Verify Command
//!
//! Checks every shard against the recorded fingerprints.

use crate::commands::resolve_stem;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use trishard_core::{Mismatch, ShardHealth, ShardSet, SHARD_COUNT};

/// Verify configuration
pub struct VerifyConfig {
    pub stem: String,
    pub dir: PathBuf,
}

/// Run verify command
pub fn run(config: VerifyConfig) -> Result<()> {
    let shard_set = ShardSet::new(&config.dir, resolve_stem(&config.stem));
    let available = shard_set.available_shards();

    let diagnosis = match shard_set.diagnose() {
        Ok(diagnosis) => diagnosis,
        Err(e) => {
            println!(
                "{} Shard set {} cannot be recovered",
                style(symbols::CROSS).red(),
                shard_set.stem()
            );
            return Err(e).context("Verification failed");
        }
    };

    for index in 0..SHARD_COUNT {
        let status = if !available.contains(&index) {
            style("missing").red()
        } else if diagnosis.mismatch.contains(Mismatch::shard(index)) {
            style("corrupted").red()
        } else {
            style("ok").green()
        };
        println!("  shard {}: {}", index, status);
    }

    match diagnosis.health() {
        ShardHealth::Healthy => println!(
            "{} All shards intact",
            style(symbols::CHECK).green()
        ),
        ShardHealth::Degraded { dead_shard } => println!(
            "{} Degraded: shard {} is lost, the file can still be rebuilt",
            style(symbols::WARN).yellow(),
            dead_shard
        ),
    }

    Ok(())
}
