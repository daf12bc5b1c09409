//! Split Command
//!
//! Splits a file into a three-shard set.

use crate::commands::format_bytes;
use crate::passphrase;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use trishard_core::split_file;

/// Split configuration
pub struct SplitConfig {
    pub file: PathBuf,
    pub dir: PathBuf,
    pub encrypt: bool,
    pub passphrase_env: Option<String>,
}

/// Run split command
pub fn run(config: SplitConfig) -> Result<()> {
    if !config.file.is_file() {
        anyhow::bail!("Not a regular file: {}", config.file.display());
    }
    let size = std::fs::metadata(&config.file)
        .with_context(|| format!("Failed to stat {}", config.file.display()))?
        .len();

    let passphrase = if config.encrypt {
        Some(passphrase::read(config.passphrase_env.as_deref(), true)?)
    } else {
        None
    };

    let outcome = split_file(
        &config.file,
        &config.dir,
        passphrase.as_deref().map(str::as_bytes),
    )
    .with_context(|| format!("Failed to split {}", config.file.display()))?;

    println!(
        "{} Split {} ({})",
        style(symbols::CHECK).green(),
        style(config.file.display()).bold(),
        format_bytes(size)
    );
    println!("  Stem:        {}", style(&outcome.stem).cyan());
    println!("  Fingerprint: {}", outcome.input_hash);
    println!("  Directory:   {}", outcome.shard_set.dir().display());
    if config.encrypt {
        println!("  {} Encrypted", symbols::LOCK);
    } else {
        println!("  {}", style("Not encrypted").yellow());
    }

    Ok(())
}
