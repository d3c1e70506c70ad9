//! Provisioner for boot2docker hosts
//!
//! The engine reads its flags from `/var/lib/boot2docker/profile` and is
//! controlled through the init script.

use async_trait::async_trait;

use super::error::ProvisionError;
use super::os_release::OsRelease;
use super::{Provisioner, ServiceAction, daemon_options};
use crate::driver::DockerConfig;
use crate::host::{AuthOptions, RemoteShell, shell_quote};

const CONFIG_DIR: &str = "/var/lib/boot2docker";

/// Stops the engine only if its pid file points at a live process
const STOP_IF_RUNNING: &str = "if [ -e /var/run/docker.pid ] && [ -d /proc/$(cat /var/run/docker.pid) ]; \
     then sudo /etc/init.d/docker stop; fi; exit 0";

#[derive(Debug, Clone, Copy, Default)]
pub struct Boot2DockerProvisioner;

#[async_trait]
impl Provisioner for Boot2DockerProvisioner {
    fn name(&self) -> &'static str {
        "boot2docker"
    }

    fn compatible_with(&self, os: &OsRelease) -> bool {
        os.id == "boot2docker"
    }

    fn docker_config_dir(&self) -> &'static str {
        CONFIG_DIR
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
            .write_file(
                &format!("{CONFIG_DIR}/etc/hostname"),
                format!("{hostname}\n").as_bytes(),
            )
            .await?;
        Ok(())
    }

    async fn service(
        &self,
        shell: &dyn RemoteShell,
        action: ServiceAction,
    ) -> Result<(), ProvisionError> {
        let command = match action {
            ServiceAction::Stop => STOP_IF_RUNNING.to_string(),
            other => format!("sudo /etc/init.d/docker {}", other.as_str()),
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
        let profile = format!(
            "EXTRA_ARGS='{options}'\nCACERT={}\nSERVERCERT={}\nSERVERKEY={}\nDOCKER_TLS=no\n",
            auth.ca_cert_remote_path, auth.server_cert_remote_path, auth.server_key_remote_path,
        );
        DockerConfig {
            engine_config: profile,
            engine_config_path: format!("{CONFIG_DIR}/profile"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeShell;

    fn auth() -> AuthOptions {
        AuthOptions {
            ca_cert_remote_path: format!("{CONFIG_DIR}/ca.pem"),
            server_cert_remote_path: format!("{CONFIG_DIR}/server.pem"),
            server_key_remote_path: format!("{CONFIG_DIR}/server-key.pem"),
            ..Default::default()
        }
    }

    #[test]
    fn test_profile_maps_each_file_to_its_variable() {
        let config = Boot2DockerProvisioner.generate_docker_config(2376, &auth(), "rivet");
        assert_eq!(config.engine_config_path, "/var/lib/boot2docker/profile");

        let profile = config.engine_config;
        assert!(profile.contains("CACERT=/var/lib/boot2docker/ca.pem\n"));
        assert!(profile.contains("SERVERCERT=/var/lib/boot2docker/server.pem\n"));
        assert!(profile.contains("SERVERKEY=/var/lib/boot2docker/server-key.pem\n"));
        assert!(profile.contains("DOCKER_TLS=no"));
        assert!(profile.starts_with("EXTRA_ARGS='--tlsverify"));
        assert!(profile.contains("--label=provider=rivet'"));
    }

    #[tokio::test]
    async fn test_stop_is_conditional() {
        let shell = FakeShell::new();
        Boot2DockerProvisioner
            .service(&shell, ServiceAction::Stop)
            .await
            .unwrap();

        let commands = shell.commands();
        assert!(commands[0].starts_with("if [ -e /var/run/docker.pid ]"));
        assert!(commands[0].ends_with("exit 0"));
    }

    #[tokio::test]
    async fn test_hostname_persists_in_boot2docker_dir() {
        let shell = FakeShell::new();
        Boot2DockerProvisioner
            .set_hostname(&shell, "b2d")
            .await
            .unwrap();
        assert_eq!(
            shell.file("/var/lib/boot2docker/etc/hostname").as_deref(),
            Some("b2d\n")
        );
    }
}
