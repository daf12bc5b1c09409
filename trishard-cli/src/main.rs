//! TriShard CLI
//!
//! Command-line front end for three-shard rotating-parity erasure coding.
//!
//! # Commands
//! - `split` - Split a file into three shards plus metadata
//! - `merge` - Rebuild a file from any two shards
//! - `inspect` - Print the metadata record of a shard set
//! - `verify` - Check shard health against the metadata
//! - `config` - Show or edit configuration
//!
//! # Configuration
//! Config file: ~/.trishard/config.toml

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod passphrase;
mod symbols;

use commands::{inspect, merge, split, verify};

#[derive(Parser)]
#[command(name = "trishard")]
#[command(about = "Split files into three shards, any two of which rebuild the file")]
#[command(version)]
struct Cli {
    /// Shard directory (overrides config file)
    #[arg(long, global = true, env = "TRISHARD_SHARD_DIR")]
    dir: Option<PathBuf>,

    /// Read the passphrase from this environment variable instead of prompting
    #[arg(long, global = true, value_name = "VAR")]
    passphrase_env: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into a shard set
    Split {
        /// File to split
        file: PathBuf,

        /// Store shards unencrypted
        #[arg(long)]
        no_encrypt: bool,
    },

    /// Rebuild a file from its shard set
    Merge {
        /// Shard set stem, or the original file name
        stem: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the metadata of a shard set
    Inspect {
        /// Shard set stem, or the original file name
        stem: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check which shards are intact
    Verify {
        /// Shard set stem, or the original file name
        stem: String,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., shards.dir, encryption.enabled)
        key: String,
        /// Value to set
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    // Load configuration from ~/.trishard/config.toml
    let cfg = config::load_config();

    // CLI args override config file
    let dir = cli.dir.unwrap_or(cfg.shards.dir);
    let passphrase_env = cli.passphrase_env;

    match cli.command {
        Commands::Split { file, no_encrypt } => {
            let config = split::SplitConfig {
                file,
                dir,
                encrypt: cfg.encryption.enabled && !no_encrypt,
                passphrase_env,
            };
            split::run(config)?;
        }

        Commands::Merge { stem, output } => {
            let config = merge::MergeConfig {
                stem,
                dir,
                output,
                passphrase_env,
            };
            merge::run(config)?;
        }

        Commands::Inspect { stem, json } => {
            let config = inspect::InspectConfig { stem, dir, json };
            inspect::run(config)?;
        }

        Commands::Verify { stem } => {
            let config = verify::VerifyConfig { stem, dir };
            verify::run(config)?;
        }

        Commands::Config { command } => {
            handle_config_command(command)?;
        }
    }

    Ok(())
}

/// Handle config subcommands
fn handle_config_command(command: Option<ConfigCommands>) -> Result<()> {
    use console::style;

    match command {
        None | Some(ConfigCommands::Show) => {
            let cfg = config::load_config();
            println!();
            println!("{}", style("TriShard Configuration").bold().underlined());
            println!();
            println!("{}", style("[shards]").cyan());
            println!("  dir = \"{}\"", cfg.shards.dir.display());
            println!();
            println!("{}", style("[encryption]").cyan());
            println!("  enabled = {}", cfg.encryption.enabled);
            println!();

            if let Ok(path) = config::config_file_path() {
                println!("{} {}", style("Config file:").dim(), path.display());
                if !path.exists() {
                    println!(
                        "{} Run '{}' to create it",
                        style("(not created yet)").yellow(),
                        style("trishard config init").green()
                    );
                }
            }
        }

        Some(ConfigCommands::Path) => {
            if let Ok(path) = config::config_file_path() {
                println!("{}", path.display());
            }
        }

        Some(ConfigCommands::Init { force }) => {
            let path = config::config_file_path()?;
            if path.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(symbols::WARN).yellow(),
                    path.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            config::save_config(&config::TriShardConfig::default())?;
            println!(
                "{} Config file created at {}",
                style(symbols::CHECK).green(),
                path.display()
            );
        }

        Some(ConfigCommands::Set { key, value }) => {
            let mut cfg = config::load_config();
            config::set_value(&mut cfg, &key, &value)?;
            config::save_config(&cfg)?;
            println!("{} Configuration updated", style(symbols::CHECK).green());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_shard_dir_reads_env() {
        let command = Cli::command();
        let dir = command
            .get_arguments()
            .find(|arg| arg.get_id() == "dir")
            .unwrap();
        assert_eq!(dir.get_env(), Some(OsStr::new("TRISHARD_SHARD_DIR")));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "trishard", "merge", "notes.txt", "--output", "out.txt", "--dir", "/srv/shards",
        ])
        .unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/srv/shards")));
        assert!(matches!(cli.command, Commands::Merge { .. }));
    }
}
