//! Settings management for dockhand
//!
//! Handles loading, saving, and validating the JSONC settings file.
//! Creates a default file if missing, validates against the schema.

pub mod paths;
pub mod schema;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jsonc_parser::parse_to_serde_value;

pub use paths::{MachinePaths, get_base_dir, get_config_dir, get_config_path};
pub use schema::{Config, validate_config};

/// Ensure the config directory exists
///
/// Creates `~/.config/dockhand/` if it doesn't exist.
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir =
        get_config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;
        tracing::info!("Created config directory: {}", config_dir.display());
    }

    Ok(config_dir)
}

/// Load settings from the default location
///
/// If the file doesn't exist, creates one with default values.
pub fn load_config() -> Result<Config> {
    let config_path =
        get_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if !config_path.exists() {
        tracing::info!(
            "Config file not found, creating default at: {}",
            config_path.display()
        );
        let config = Config::default();
        save_config(&config)?;
        return Ok(config);
    }

    load_config_from(&config_path)
}

/// Load settings from an explicit path
///
/// Supports JSONC (JSON with comments) and rejects unknown fields.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let mut file = File::open(config_path)
        .with_context(|| format!("Failed to open config file: {}", config_path.display()))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let parsed_value = parse_to_serde_value(&contents, &Default::default())
        .map_err(|e| anyhow::anyhow!("Invalid JSONC in config file: {}", e))?
        .ok_or_else(|| anyhow::anyhow!("Config file is empty"))?;

    let config: Config = serde_json::from_value(parsed_value).with_context(|| {
        format!(
            "Invalid configuration in {}. Check for unknown fields or invalid values.",
            config_path.display()
        )
    })?;

    validate_config(&config).map_err(|e| {
        anyhow::anyhow!("Invalid configuration in {}: {}", config_path.display(), e)
    })?;

    Ok(config)
}

/// Save settings to the default location
pub fn save_config(config: &Config) -> Result<()> {
    ensure_config_dir()?;

    let config_path =
        get_config_path().ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    save_config_to(config, &config_path)
}

/// Save settings to an explicit path
///
/// Creates a backup of the existing file (config.json.bak) before overwriting.
pub fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        fs::copy(config_path, &backup_path)
            .with_context(|| format!("Failed to create backup at: {}", backup_path.display()))?;
        tracing::debug!("Created config backup: {}", backup_path.display());
    }

    let json = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

    let mut file = File::create(config_path)
        .with_context(|| format!("Failed to create config file: {}", config_path.display()))?;

    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    tracing::debug!("Saved config to: {}", config_path.display());

    Ok(())
}
