//! Driver error types

use thiserror::Error;

use crate::cert::CertError;

/// Errors that can occur during driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    /// The backend has no meaning for this operation
    #[error("The {driver} driver does not support {operation}")]
    NotSupported {
        driver: String,
        operation: &'static str,
    },

    /// A required option was not supplied
    #[error("The {driver} driver requires the --{option} option")]
    MissingOption { driver: String, option: String },

    /// An option value could not be interpreted
    #[error("Invalid value for --{option}: {message}")]
    InvalidOption { option: String, message: String },

    /// No constructor registered under this name
    #[error("Unknown driver {0:?}")]
    UnknownDriver(String),

    /// A constructor is already registered under this name
    #[error("Driver already registered: {0}")]
    AlreadyRegistered(String),

    /// The machine exists but is not running
    #[error("Host is not running")]
    HostNotRunning,

    /// Error reported by the backend, surfaced verbatim
    #[error("{0}")]
    Api(String),

    /// Fleet membership could not be resolved
    #[error("Unable to resolve cluster members: {0}")]
    Membership(String),

    /// Reading ~/.ssh/config failed
    #[error("Failed to read SSH config: {0}")]
    SshConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid driver configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Cert(#[from] CertError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub fn not_supported(driver: &str, operation: &'static str) -> Self {
        DriverError::NotSupported {
            driver: driver.to_string(),
            operation,
        }
    }

    pub fn missing_option(driver: &str, option: &str) -> Self {
        DriverError::MissingOption {
            driver: driver.to_string(),
            option: option.to_string(),
        }
    }

    /// Errors that mean "no URL to show" rather than a real failure
    pub fn is_benign_for_listing(&self) -> bool {
        matches!(
            self,
            DriverError::NotSupported { .. } | DriverError::HostNotRunning
        )
    }
}
