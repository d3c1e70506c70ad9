//! Provisioning error types

use thiserror::Error;

use crate::cert::CertError;
use crate::driver::DriverError;
use crate::host::ShellError;

/// Errors that abort the provisioning pipeline
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// No registered provisioner is compatible with the remote OS
    #[error("Unknown OS: no provisioner is compatible with {0}")]
    UnknownOs(String),

    /// /etc/os-release could not be interpreted
    #[error("Could not detect Linux distribution: {0}")]
    OsRelease(String),

    /// The engine install command exited non-zero
    #[error("Error installing docker:\n{output}")]
    Install { output: String },

    /// The engine port never accepted connections
    #[error("Docker engine at {addr} is not reachable: {reason}")]
    EngineUnreachable { addr: String, reason: String },

    /// The driver reported an engine URL that cannot be parsed
    #[error("Invalid engine URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A provisioner with this name is already registered
    #[error("Provisioner already registered: {0}")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Error generating server cert: {0}")]
    Cert(#[from] CertError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
