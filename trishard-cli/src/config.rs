//! Configuration management
//!
//! Handles storing and loading CLI configuration.
//! Config directory: ~/.trishard/ (cross-platform)
//!
//! Config file format (~/.trishard/config.toml):
//! ```toml
//! [shards]
//! dir = "./shards"
//!
//! [encryption]
//! enabled = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Structure of ~/.trishard/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriShardConfig {
    /// Where shard sets are stored
    #[serde(default)]
    pub shards: ShardsConfig,

    /// Encryption defaults for `split`
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

/// Shard storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardsConfig {
    /// Directory holding `<stem>.{0,1,2,m}` files
    #[serde(default = "default_shard_dir")]
    pub dir: PathBuf,
}

impl Default for ShardsConfig {
    fn default() -> Self {
        Self {
            dir: default_shard_dir(),
        }
    }
}

fn default_shard_dir() -> PathBuf {
    std::env::var("TRISHARD_SHARD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./shards"))
}

/// Encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Encrypt on split unless `--no-encrypt` is given
    #[serde(default = "default_encryption_enabled")]
    pub enabled: bool,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: default_encryption_enabled(),
        }
    }
}

fn default_encryption_enabled() -> bool {
    std::env::var("TRISHARD_ENCRYPT")
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(true)
}

/// Parse the boolean spellings accepted in env vars and `config set`
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the config directory path (~/.trishard/)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let config_dir = home.join(".trishard");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory ~/.trishard/")?;
    }

    Ok(config_dir)
}

/// Get the config file path
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration from file
/// Falls back to defaults if file doesn't exist
pub fn load_config() -> TriShardConfig {
    match config_file_path() {
        Ok(path) if path.exists() => match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    TriShardConfig::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                TriShardConfig::default()
            }
        },
        _ => TriShardConfig::default(),
    }
}

/// Save configuration to file
pub fn save_config(config: &TriShardConfig) -> Result<()> {
    let path = config_file_path()?;
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&path, content).context("Failed to write config file")?;
    Ok(())
}

/// Apply `config set <key> <value>`
pub fn set_value(config: &mut TriShardConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "shards.dir" => config.shards.dir = PathBuf::from(value),
        "encryption.enabled" => {
            config.encryption.enabled = parse_bool(value)
                .with_context(|| format!("Expected true or false, got '{}'", value))?;
        }
        _ => anyhow::bail!(
            "Unknown config key: {}. Valid keys: shards.dir, encryption.enabled",
            key
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = TriShardConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();

        assert!(toml_str.contains("[shards]"));
        assert!(toml_str.contains("[encryption]"));
        assert!(toml_str.contains("dir"));
        assert!(toml_str.contains("enabled"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TriShardConfig = toml::from_str("[shards]\ndir = \"/srv/shards\"\n").unwrap();
        assert_eq!(config.shards.dir, PathBuf::from("/srv/shards"));
        assert_eq!(config.encryption.enabled, default_encryption_enabled());
    }

    #[test]
    fn test_set_value() {
        let mut config = TriShardConfig::default();
        set_value(&mut config, "encryption.enabled", "off").unwrap();
        assert!(!config.encryption.enabled);
        set_value(&mut config, "shards.dir", "/data").unwrap();
        assert_eq!(config.shards.dir, PathBuf::from("/data"));

        assert!(set_value(&mut config, "encryption.enabled", "maybe").is_err());
        assert!(set_value(&mut config, "gateway.url", "x").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("2"), None);
    }
}
