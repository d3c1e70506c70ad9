//! ~/.ssh/config lookups
//!
//! Fills SSH user, port and identity file for machines added by address when
//! the caller did not specify them.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ssh2_config::{ParseRule, SshConfig};

use super::error::DriverError;

/// Settings found in the user's SSH config for a host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SshConfigMatch {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

/// Get the path to the user's SSH config file
pub fn get_ssh_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("config"))
}

/// Query the user's SSH config for a hostname
///
/// A missing config file is not an error.
pub fn query_ssh_config(hostname: &str) -> Result<SshConfigMatch, DriverError> {
    match get_ssh_config_path() {
        Some(path) if path.exists() => query_ssh_config_at(&path, hostname),
        _ => {
            tracing::debug!("No SSH config file found");
            Ok(SshConfigMatch::default())
        }
    }
}

/// Query an explicit SSH config file
///
/// Applies SSH precedence rules (first match wins).
pub fn query_ssh_config_at(path: &Path, hostname: &str) -> Result<SshConfigMatch, DriverError> {
    let file = File::open(path).map_err(|e| {
        DriverError::SshConfig(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    let config = SshConfig::default()
        .parse(&mut reader, ParseRule::ALLOW_UNKNOWN_FIELDS)
        .map_err(|e| DriverError::SshConfig(format!("Failed to parse SSH config: {e}")))?;

    let params = config.query(hostname);

    Ok(SshConfigMatch {
        user: params.user,
        port: params.port,
        identity_file: params
            .identity_file
            .and_then(|files| files.first().map(|f| f.to_string_lossy().to_string())),
    })
}
