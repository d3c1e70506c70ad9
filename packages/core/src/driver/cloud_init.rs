//! Cloud-init bootstrap documents
//!
//! Backends that cannot be reached over SSH while they boot receive the
//! engine configuration and TLS material as cloud-init user data instead.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::error::DriverError;
use super::{DEFAULT_ENGINE_PORT, DockerConfig, Driver};
use crate::cert::{CertError, issue_certificate};
use crate::provision::{daemon_options, systemd};

/// Key size for the server certificate embedded in the document
const SERVER_KEY_BITS: u32 = 2048;

/// Engine listen address and remote TLS paths
#[derive(Debug, Clone, PartialEq)]
pub struct MachineOptions {
    pub host: String,
    pub labels: Vec<String>,
    pub ca_cert_path: String,
    pub server_cert_path: String,
    pub server_key_path: String,
}

impl MachineOptions {
    /// Defaults: listen on all interfaces, TLS files in the driver's config dir
    pub fn for_driver(driver: &dyn Driver) -> Self {
        let dir = driver.docker_config_dir();
        Self {
            host: format!("tcp://0.0.0.0:{DEFAULT_ENGINE_PORT}"),
            labels: Vec::new(),
            ca_cert_path: format!("{dir}/ca.pem"),
            server_cert_path: format!("{dir}/server.pem"),
            server_key_path: format!("{dir}/server-key.pem"),
        }
    }
}

/// Engine configuration for a cloud-init booted machine
pub fn generate_docker_config(driver: &dyn Driver, opts: &MachineOptions) -> DockerConfig {
    let mut options = daemon_options(
        &opts.ca_cert_path,
        &opts.server_cert_path,
        &opts.server_key_path,
        &opts.host,
        driver.driver_name(),
    );
    for label in &opts.labels {
        options.push_str(&format!(" --label={label}"));
    }
    DockerConfig {
        engine_config: systemd::render_drop_in(&options),
        engine_config_path: systemd::DROP_IN_PATH.to_string(),
    }
}

/// Render the cloud-config document
pub fn generate_cloud_init(
    driver: &dyn Driver,
    opts: Option<MachineOptions>,
) -> Result<String, DriverError> {
    let opts = opts.unwrap_or_else(|| MachineOptions::for_driver(driver));

    let ca_cert = std::fs::read(driver.ca_cert_path())
        .map_err(|e| CertError::io(driver.ca_cert_path(), e))?;
    let server = issue_certificate(
        &["*"],
        driver.ca_cert_path(),
        driver.ca_key_path(),
        driver.machine_name(),
        SERVER_KEY_BITS,
    )?;
    let docker_config = generate_docker_config(driver, &opts);

    let document = format!(
        r#"#cloud-config
package_update: true

packages:
  - curl

write_files:
  - encoding: base64
    content: {engine_config}
    path: {engine_config_path}
    permissions: '0644'
  - encoding: base64
    content: {ca_cert}
    path: {ca_cert_path}
    permissions: '0644'
  - encoding: base64
    content: {server_cert}
    path: {server_cert_path}
    permissions: '0644'
  - encoding: base64
    content: {server_key}
    path: {server_key_path}
    permissions: '0600'

runcmd:
  - [ sh, -c, "command -v docker >/dev/null 2>&1 || curl -sSL https://get.docker.com | sh -" ]
  - [ systemctl, daemon-reload ]
  - [ systemctl, restart, docker ]

final_message: "dockhand provisioning complete"
"#,
        engine_config = STANDARD.encode(docker_config.engine_config.as_bytes()),
        engine_config_path = docker_config.engine_config_path,
        ca_cert = STANDARD.encode(&ca_cert),
        ca_cert_path = opts.ca_cert_path,
        server_cert = STANDARD.encode(&server.cert_pem),
        server_cert_path = opts.server_cert_path,
        server_key = STANDARD.encode(&server.key_pem),
        server_key_path = opts.server_key_path,
    );

    tracing::debug!(
        "Generated cloud config for {} ({} bytes)",
        driver.machine_name(),
        document.len()
    );
    Ok(document)
}

/// The cloud-config document, base64 encoded for transport
pub fn generate_cloud_init_base64(
    driver: &dyn Driver,
    opts: Option<MachineOptions>,
) -> Result<String, DriverError> {
    let document = generate_cloud_init(driver, opts)?;
    Ok(STANDARD.encode(document.as_bytes()))
}
