//! Settings schema for dockhand
//!
//! Defines the structure and defaults for `~/.config/dockhand/config.json`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tool-wide settings
///
/// Serialized to/from `~/.config/dockhand/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Config file version for migrations
    pub version: u32,

    /// Attempts made while waiting for SSH on a new machine (default: 60)
    #[serde(default = "default_ssh_max_retries")]
    pub ssh_max_retries: u32,

    /// Fixed delay between reachability attempts in milliseconds (default: 1000)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Attempts made while waiting for the engine TCP port before joining a swarm (default: 60)
    #[serde(default = "default_engine_max_retries")]
    pub engine_max_retries: u32,

    /// Upper bound for start/stop state transitions in seconds (default: 300)
    #[serde(default = "default_state_timeout_secs")]
    pub state_timeout_secs: u64,

    /// Maximum fleet members operated on at once (default: 8)
    #[serde(default = "default_fleet_max_concurrency")]
    pub fleet_max_concurrency: usize,

    /// Upper bound for a single fleet member operation in seconds (default: 900)
    #[serde(default = "default_fleet_task_timeout_secs")]
    pub fleet_task_timeout_secs: u64,

    /// RSA modulus size for every generated key (default: 2048)
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,

    /// Image used for swarm manager and agent containers (default: "swarm:latest")
    #[serde(default = "default_swarm_image")]
    pub swarm_image: String,
}

fn default_ssh_max_retries() -> u32 {
    60
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_engine_max_retries() -> u32 {
    60
}

fn default_state_timeout_secs() -> u64 {
    300
}

fn default_fleet_max_concurrency() -> usize {
    8
}

fn default_fleet_task_timeout_secs() -> u64 {
    900
}

fn default_key_bits() -> u32 {
    2048
}

fn default_swarm_image() -> String {
    "swarm:latest".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            ssh_max_retries: default_ssh_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
            engine_max_retries: default_engine_max_retries(),
            state_timeout_secs: default_state_timeout_secs(),
            fleet_max_concurrency: default_fleet_max_concurrency(),
            fleet_task_timeout_secs: default_fleet_task_timeout_secs(),
            key_bits: default_key_bits(),
            swarm_image: default_swarm_image(),
        }
    }
}

impl Config {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_secs(self.state_timeout_secs)
    }

    pub fn fleet_task_timeout(&self) -> Duration {
        Duration::from_secs(self.fleet_task_timeout_secs)
    }
}

/// Validate settings values that serde cannot express
///
/// Returns the first violation as a human-readable message.
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.ssh_max_retries == 0 {
        return Err("ssh_max_retries must be at least 1".to_string());
    }
    if config.engine_max_retries == 0 {
        return Err("engine_max_retries must be at least 1".to_string());
    }
    if config.state_timeout_secs == 0 {
        return Err("state_timeout_secs must be greater than 0".to_string());
    }
    if config.fleet_max_concurrency == 0 {
        return Err("fleet_max_concurrency must be at least 1".to_string());
    }
    if config.fleet_task_timeout_secs == 0 {
        return Err("fleet_task_timeout_secs must be greater than 0".to_string());
    }
    if config.key_bits < 2048 {
        return Err(format!(
            "key_bits must be at least 2048 (got {})",
            config.key_bits
        ));
    }
    if config.swarm_image.trim().is_empty() {
        return Err("swarm_image must not be empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.retry_interval(), Duration::from_secs(1));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_deserialize_minimal_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"version": 1}"#).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: Result<Config, _> =
            serde_json::from_str(r#"{"version": 1, "ssh_retries": 3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_small_keys() {
        let config = Config {
            key_bits: 1024,
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("key_bits"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            fleet_max_concurrency: 0,
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
