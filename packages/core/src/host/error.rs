//! Host-specific error types
//!
//! Errors that can occur during host lifecycle operations.

use std::time::Duration;

use thiserror::Error;

use crate::cert::CertError;
use crate::driver::{DriverError, State};
use crate::provision::ProvisionError;

use super::ssh::ShellError;

/// Errors that can occur during host operations
#[derive(Error, Debug)]
pub enum HostError {
    /// Name contains characters outside `[a-zA-Z0-9.-]`
    #[error("Invalid host name {0:?}: names may only contain letters, digits, '.' and '-', and may not start with '.'")]
    InvalidName(String),

    /// Host already exists
    #[error("Host already exists: {0}")]
    AlreadyExists(String),

    /// Host not found in the machine directory
    #[error("Host not found: {0}")]
    NotFound(String),

    /// SSH never became reachable
    #[error("Too many retries waiting for SSH ({retries} attempts). Last error: {last_error}")]
    SshTimeout { retries: u32, last_error: String },

    /// The driver never reported the requested state
    #[error("Timed out after {}s waiting for host to be {target}", timeout.as_secs())]
    StateTimeout { target: State, timeout: Duration },

    /// Some fleet members failed to reach the requested state
    #[error("Only some members reached {target}; check each member's state")]
    Degraded { target: State },

    /// Upgrades are not implemented in this version
    #[error("Upgrade is not available yet; recreate the host to get a newer engine")]
    UpgradeDeferred,

    /// Failed to load a host record
    #[error("Failed to load host: {0}")]
    LoadFailed(String),

    /// Failed to save a host record
    #[error("Failed to save host: {0}")]
    SaveFailed(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Cert(#[from] CertError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
