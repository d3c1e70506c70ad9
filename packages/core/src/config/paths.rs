//! Path resolution for dockhand
//!
//! Two roots are involved:
//! - the tool settings directory (`~/.config/dockhand/`, XDG-style on every
//!   unix platform, `%APPDATA%\dockhand\` on Windows)
//! - the machine storage root (`<base>/.docker/machines/`), where `<base>` is
//!   `$MACHINE_DIR` when set and the home directory otherwise

use std::path::{Path, PathBuf};

/// Environment variable overriding the machine storage base directory
pub const MACHINE_DIR_ENV: &str = "MACHINE_DIR";

/// Get the configuration directory path
pub fn get_config_dir() -> Option<PathBuf> {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".config").join("dockhand"))
    }
    #[cfg(target_os = "windows")]
    {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .map(|d| d.join("dockhand"))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

/// Get the full path to the settings file
///
/// Returns: `{config_dir}/config.json`
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join("config.json"))
}

/// Resolve the machine storage base directory
///
/// `$MACHINE_DIR` wins over the home directory.
pub fn get_base_dir() -> Option<PathBuf> {
    match std::env::var_os(MACHINE_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()),
    }
}

/// Local trust and host storage layout
///
/// ```text
/// <base>/.docker/machines/
///   .ca/{ca,ca-key}.pem           the local certificate authority
///   .client/{ca,cert,key}.pem     client material for the Docker CLI
///   .active                       name of the active machine
///   <name>/config.json            persisted host record
///   <name>/{ca,cert,key}.pem      per-host copy of the client material
///   <name>/{server,server-key}.pem
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachinePaths {
    machine_dir: PathBuf,
}

impl MachinePaths {
    /// Layout rooted at `<base>/.docker/machines`
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            machine_dir: base.as_ref().join(".docker").join("machines"),
        }
    }

    /// Layout rooted at an explicit machine directory
    pub fn from_machine_dir(machine_dir: impl Into<PathBuf>) -> Self {
        Self {
            machine_dir: machine_dir.into(),
        }
    }

    /// Layout resolved from `$MACHINE_DIR` or the home directory
    pub fn from_env() -> Option<Self> {
        get_base_dir().map(Self::new)
    }

    pub fn machine_dir(&self) -> &Path {
        &self.machine_dir
    }

    pub fn client_cert_dir(&self) -> PathBuf {
        self.machine_dir.join(".client")
    }

    pub fn host_dir(&self, name: &str) -> PathBuf {
        self.machine_dir.join(name)
    }

    pub fn active_path(&self) -> PathBuf {
        self.machine_dir.join(".active")
    }

    pub fn ca_dir(&self) -> PathBuf {
        self.machine_dir.join(".ca")
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.ca_dir().join("ca.pem")
    }

    /// CA private key. Never leaves this machine.
    pub fn ca_key_path(&self) -> PathBuf {
        self.ca_dir().join("ca-key.pem")
    }

    pub fn client_cert_path(&self) -> PathBuf {
        self.client_cert_dir().join("cert.pem")
    }

    pub fn client_key_path(&self) -> PathBuf {
        self.client_cert_dir().join("key.pem")
    }
}
