//! Passphrase acquisition
//!
//! The passphrase comes from an environment variable when one is available
//! (`--passphrase-env <VAR>`, otherwise `TRISHARD_PASSPHRASE`) and from an
//! interactive prompt otherwise.

use anyhow::{Context, Result};
use std::env::VarError;

/// Variable consulted when `--passphrase-env` is not given
pub const DEFAULT_ENV: &str = "TRISHARD_PASSPHRASE";

/// Obtain a passphrase, asking twice when `confirm` is set
pub fn read(env_var: Option<&str>, confirm: bool) -> Result<String> {
    let var = env_var.unwrap_or(DEFAULT_ENV);
    if let Some(passphrase) = from_env(var, std::env::var(var), env_var.is_some())? {
        tracing::debug!("using passphrase from ${}", var);
        return Ok(passphrase);
    }
    prompt(confirm)
}

/// Interpret an environment lookup. A variable named explicitly must be set.
fn from_env(
    var: &str,
    value: std::result::Result<String, VarError>,
    explicit: bool,
) -> Result<Option<String>> {
    match value {
        Ok(passphrase) if !passphrase.is_empty() => Ok(Some(passphrase)),
        Ok(_) if explicit => anyhow::bail!("Environment variable {} is empty", var),
        Err(e) if explicit => {
            Err(e).with_context(|| format!("Cannot read passphrase from ${}", var))
        }
        _ => Ok(None),
    }
}

fn prompt(confirm: bool) -> Result<String> {
    let passphrase =
        rpassword::prompt_password("Passphrase: ").context("Failed to read passphrase")?;
    if passphrase.is_empty() {
        anyhow::bail!("Passphrase cannot be empty");
    }

    if confirm {
        let again = rpassword::prompt_password("Confirm passphrase: ")
            .context("Failed to read passphrase")?;
        if passphrase != again {
            anyhow::bail!("Passphrases do not match");
        }
    }

    Ok(passphrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_value_wins() {
        let got = from_env("X", Ok("secret".to_string()), false).unwrap();
        assert_eq!(got.as_deref(), Some("secret"));
    }

    #[test]
    fn test_unset_default_falls_back_to_prompt() {
        assert!(from_env(DEFAULT_ENV, Err(VarError::NotPresent), false)
            .unwrap()
            .is_none());
        assert!(from_env(DEFAULT_ENV, Ok(String::new()), false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_explicit_variable_must_be_set() {
        let err = from_env("MY_PASS", Err(VarError::NotPresent), true).unwrap_err();
        assert!(err.to_string().contains("MY_PASS"));
        assert!(from_env("MY_PASS", Ok(String::new()), true).is_err());
    }
}
