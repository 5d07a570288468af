//! `mangahub config`: inspect and edit the config file.
//!
//! ```bash
//! mangahub config                                 # print everything
//! mangahub config server_url                      # print one key
//! mangahub config server_url http://chat:9093     # set and save
//! ```

use anyhow::{Context, Result};

use crate::config::{Config, KEYS};

/// Print the effective config (file plus environment overrides) as JSON.
pub fn show(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Print one key.
pub fn get(config: &Config, key: &str) -> Result<()> {
    let value = config
        .get(key)
        .with_context(|| format!("Unknown config key {key:?} (expected one of: {})", KEYS.join(", ")))?;
    println!("{value}");
    Ok(())
}

/// Set one key and persist the file.
///
/// Starts from the file on disk, not the env-overridden config, so overrides
/// never leak into the saved document.
pub fn set(key: &str, value: &str) -> Result<()> {
    let dir = Config::config_dir()?;
    let mut config = Config::load_from(&dir).unwrap_or_default();
    config.set(key, value)?;
    config.save_to(&dir)?;
    log::info!("Config {key} updated");
    println!("{key} = {}", config.get(key).unwrap_or_default());
    Ok(())
}
