//! Engine connection errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors talking to a provisioned Docker engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// The host has no engine URL to connect to
    #[error("Host has no engine URL")]
    NoUrl,

    /// Client TLS material is missing
    #[error("Missing TLS file {0}. Run `dockhand create` once to bootstrap certificates.")]
    MissingCert(PathBuf),

    /// The engine port refused the connection
    #[error("Docker engine not reachable. Is the host running?")]
    NotRunning,

    /// TLS handshake or certificate verification failed
    #[error("TLS error talking to the engine: {0}. Try `dockhand regenerate-certs`.")]
    Tls(String),

    #[error("Docker connection failed: {0}")]
    Connection(String),
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        let msg = err.to_string();

        if msg.contains("connection refused") || msg.contains("Connection refused") {
            EngineError::NotRunning
        } else if msg.contains("certificate") || msg.contains("SSL") || msg.contains("handshake") {
            EngineError::Tls(msg)
        } else {
            EngineError::Connection(msg)
        }
    }
}
