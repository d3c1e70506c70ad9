//! Provisioner for systemd-based distributions
//!
//! Engine flags go into a drop-in that replaces the packaged `ExecStart`.

use async_trait::async_trait;

use super::error::ProvisionError;
use super::os_release::{DistroFamily, OsRelease};
use super::{Provisioner, ServiceAction, daemon_options};
use crate::driver::{DEFAULT_DOCKER_CONFIG_DIR, DockerConfig};
use crate::host::{AuthOptions, RemoteShell, shell_quote};

/// Drop-in overriding the engine's start command
pub const DROP_IN_PATH: &str = "/etc/systemd/system/docker.service.d/10-dockhand.conf";

/// Render the `[Service]` drop-in for the given daemon options
pub fn render_drop_in(options: &str) -> String {
    format!("[Service]\nExecStart=\nExecStart=/usr/bin/dockerd {options}\n")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdProvisioner;

#[async_trait]
impl Provisioner for SystemdProvisioner {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn compatible_with(&self, os: &OsRelease) -> bool {
        matches!(
            os.family,
            DistroFamily::Debian | DistroFamily::RedHat | DistroFamily::Suse | DistroFamily::Arch
        )
    }

    fn docker_config_dir(&self) -> &'static str {
        DEFAULT_DOCKER_CONFIG_DIR
    }

    async fn set_hostname(
        &self,
        shell: &dyn RemoteShell,
        hostname: &str,
    ) -> Result<(), ProvisionError> {
        shell
            .exec(&format!("sudo hostname {}", shell_quote(hostname)))
            .await?;
        shell
            .write_file("/etc/hostname", format!("{hostname}\n").as_bytes())
            .await?;
        Ok(())
    }

    async fn service(
        &self,
        shell: &dyn RemoteShell,
        action: ServiceAction,
    ) -> Result<(), ProvisionError> {
        let command = match action {
            ServiceAction::Stop => "sudo systemctl stop docker".to_string(),
            other => format!(
                "sudo systemctl daemon-reload && sudo systemctl {} docker",
                other.as_str()
            ),
        };
        shell.exec(&command).await?;
        Ok(())
    }

    fn generate_docker_config(
        &self,
        port: u16,
        auth: &AuthOptions,
        driver_name: &str,
    ) -> DockerConfig {
        let options = daemon_options(
            &auth.ca_cert_remote_path,
            &auth.server_cert_remote_path,
            &auth.server_key_remote_path,
            &format!("tcp://0.0.0.0:{port}"),
            driver_name,
        );
        DockerConfig {
            engine_config: render_drop_in(&options),
            engine_config_path: DROP_IN_PATH.to_string(),
        }
    }
}
