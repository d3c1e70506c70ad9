//! dockhand settings - Show or change tool settings
//!
//! Settings live in `~/.config/dockhand/config.json`. Values are changed
//! through their JSON form so every key is typed by the schema itself.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Table};
use console::style;
use dockhand_core::Config;
use dockhand_core::config::{get_config_path, save_config, validate_config};
use serde_json::Value;

#[derive(Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    command: Option<SettingsCommands>,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show every setting
    Show {
        /// Output as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print one setting
    Get {
        /// Setting name, e.g. "ssh_max_retries"
        key: String,
    },
    /// Change one setting
    Set {
        /// Setting name, e.g. "fleet_max_concurrency"
        key: String,
        value: String,
    },
    /// Restore every setting to its default
    Reset,
    /// Print the path of the settings file
    Path,
}

pub fn cmd_settings(args: SettingsArgs, config: &Config, quiet: bool) -> Result<()> {
    match args.command {
        None => show(config, false),
        Some(SettingsCommands::Show { json }) => show(config, json),
        Some(SettingsCommands::Get { key }) => {
            let value = settings_map(config)?
                .remove(&key)
                .ok_or_else(|| anyhow!("Unknown setting: {key}"))?;
            println!("{}", display_value(&value));
            Ok(())
        }
        Some(SettingsCommands::Set { key, value }) => {
            let updated = apply_setting(config, &key, &value)?;
            save_config(&updated)?;
            if !quiet {
                println!("Set {} = {}", style(&key).cyan(), style(&value).green());
            }
            Ok(())
        }
        Some(SettingsCommands::Reset) => {
            save_config(&Config::default())?;
            if !quiet {
                println!("Settings restored to defaults.");
            }
            Ok(())
        }
        Some(SettingsCommands::Path) => {
            let path =
                get_config_path().ok_or_else(|| anyhow!("Could not determine config path"))?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn settings_map(config: &Config) -> Result<serde_json::Map<String, Value>> {
    match serde_json::to_value(config).context("Failed to serialize settings")? {
        Value::Object(map) => Ok(map),
        _ => bail!("Settings did not serialize to an object"),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn show(config: &Config, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Key", "Value"]);
    for (key, value) in settings_map(config)? {
        table.add_row(vec![Cell::new(key), Cell::new(display_value(&value))]);
    }
    println!("{table}");
    Ok(())
}

/// Copy of `config` with `key` set from its string form
fn apply_setting(config: &Config, key: &str, raw: &str) -> Result<Config> {
    if key == "version" {
        bail!("version is managed by dockhand");
    }
    let mut map = settings_map(config)?;
    let parsed = match map.get(key) {
        None => bail!("Unknown setting: {key}"),
        Some(Value::String(_)) => Value::String(raw.to_string()),
        Some(Value::Number(_)) => raw
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| anyhow!("{key} expects a non-negative integer, got {raw:?}"))?,
        Some(Value::Bool(_)) => raw
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| anyhow!("{key} expects true or false, got {raw:?}"))?,
        Some(_) => bail!("{key} cannot be set from the command line"),
    };
    map.insert(key.to_string(), parsed);

    let updated: Config = serde_json::from_value(Value::Object(map))
        .with_context(|| format!("Invalid value for {key}: {raw}"))?;
    validate_config(&updated).map_err(|e| anyhow!(e))?;
    Ok(updated)
}
