//! Certificate error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while minting or checking trust material
#[derive(Error, Debug)]
pub enum CertError {
    /// OpenSSL rejected an operation (key generation, signing, parsing)
    #[error("OpenSSL error: {0}")]
    Openssl(#[from] openssl::error::ErrorStack),

    /// Reading or writing a PEM file failed
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refusing to overwrite an existing certificate or key
    #[error("Refusing to overwrite existing file: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A key exists without its certificate; minting a new pair would orphan it
    #[error("The key {} already exists without its certificate. Remove it or specify a different key/cert.", .0.display())]
    OrphanedKey(PathBuf),

    /// A certificate exists but its private key is gone
    #[error("Missing private key {}. Restore it or remove the certificate to start over.", .0.display())]
    MissingKey(PathBuf),

    /// A host entry could not be placed into the certificate
    #[error("Invalid certificate host entry: {0}")]
    InvalidHost(String),
}

impl CertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CertError::Io {
            path: path.into(),
            source,
        }
    }
}
