//! Engine verification
//!
//! Connects to a provisioned engine with the local client certificate, proving
//! that mutual TLS was configured correctly.

mod error;

use std::path::{Path, PathBuf};

use bollard::{API_DEFAULT_VERSION, Docker};

pub use error::EngineError;

/// Request timeout in seconds
const TIMEOUT_SECS: u64 = 30;

/// What a running engine reports about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Docker {} (API {}, {}/{})",
            self.version, self.api_version, self.os, self.arch
        )
    }
}

/// Client key, certificate and CA under `cert_dir`
fn client_material(cert_dir: &Path) -> Result<(PathBuf, PathBuf, PathBuf), EngineError> {
    let key = cert_dir.join("key.pem");
    let cert = cert_dir.join("cert.pem");
    let ca = cert_dir.join("ca.pem");
    for path in [&key, &cert, &ca] {
        if !path.is_file() {
            return Err(EngineError::MissingCert(path.clone()));
        }
    }
    Ok((key, cert, ca))
}

/// TLS client for the engine at `url`
pub fn connect(url: &str, cert_dir: &Path) -> Result<Docker, EngineError> {
    if url.is_empty() {
        return Err(EngineError::NoUrl);
    }
    let (key, cert, ca) = client_material(cert_dir)?;
    tracing::debug!("Connecting to {} with client certs from {}", url, cert_dir.display());
    Ok(Docker::connect_with_ssl(
        url,
        &key,
        &cert,
        &ca,
        TIMEOUT_SECS,
        API_DEFAULT_VERSION,
    )?)
}

/// Version of the engine at `url`
pub async fn engine_version(url: &str, cert_dir: &Path) -> Result<EngineInfo, EngineError> {
    let docker = connect(url, cert_dir)?;
    let version = docker.version().await?;

    let unknown = || "unknown".to_string();
    Ok(EngineInfo {
        version: version.version.unwrap_or_else(unknown),
        api_version: version.api_version.unwrap_or_else(unknown),
        os: version.os.unwrap_or_else(unknown),
        arch: version.arch.unwrap_or_else(unknown),
    })
}
