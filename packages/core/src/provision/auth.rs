//! TLS configuration of a remote engine

use std::fs;
use std::path::Path;

use reqwest::Url;

use super::error::ProvisionError;
use super::{ProvisionSettings, Provisioner, ServiceAction};
use crate::cert::{CertError, generate_cert};
use crate::driver::{DEFAULT_ENGINE_PORT, Driver};
use crate::host::{AuthOptions, RemoteShell, shell_quote};

/// Host and port of an engine URL such as `tcp://10.0.0.5:2376`
pub(crate) fn engine_endpoint(url: &str) -> Result<(String, u16), ProvisionError> {
    let parsed = Url::parse(url).map_err(|e| ProvisionError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProvisionError::InvalidUrl {
            url: url.to_string(),
            reason: "no host".to_string(),
        })?;
    Ok((host.to_string(), parsed.port().unwrap_or(DEFAULT_ENGINE_PORT)))
}

fn copy_into(src: &Path, dest: &Path) -> Result<(), ProvisionError> {
    fs::copy(src, dest).map_err(|e| CertError::io(src, e))?;
    Ok(())
}

fn remote_parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// Issue a server certificate for the machine and install it with the CA
///
/// The CA private key stays local; only the CA certificate and the
/// machine's own server pair are uploaded.
pub async fn configure_auth(
    provisioner: &dyn Provisioner,
    shell: &dyn RemoteShell,
    driver: &dyn Driver,
    auth: &mut AuthOptions,
    settings: &ProvisionSettings,
) -> Result<(), ProvisionError> {
    let machine_name = driver.machine_name();
    let store = auth.store_path.clone();
    fs::create_dir_all(&store)?;

    // client material next to the host record, for `dockhand env`
    copy_into(&auth.ca_cert_path, &store.join("ca.pem"))?;
    copy_into(&auth.client_cert_dir.join("cert.pem"), &store.join("cert.pem"))?;
    copy_into(&auth.client_cert_dir.join("key.pem"), &store.join("key.pem"))?;

    auth.server_cert_path = store.join("server.pem");
    auth.server_key_path = store.join("server-key.pem");

    let ip = driver.get_ip().await?;
    tracing::debug!(
        "generating server cert: {} ca-key={} org={}",
        auth.server_cert_path.display(),
        auth.ca_key_path.display(),
        machine_name
    );
    generate_cert(
        &[ip.as_str()],
        &auth.server_cert_path,
        &auth.server_key_path,
        &auth.ca_cert_path,
        &auth.ca_key_path,
        machine_name,
        settings.key_bits,
    )?;

    provisioner.service(shell, ServiceAction::Stop).await?;

    let docker_dir = provisioner.docker_config_dir();
    shell
        .exec(&format!("sudo mkdir -p {}", shell_quote(docker_dir)))
        .await?;

    auth.ca_cert_remote_path = format!("{docker_dir}/ca.pem");
    auth.server_cert_remote_path = format!("{docker_dir}/server.pem");
    auth.server_key_remote_path = format!("{docker_dir}/server-key.pem");

    let uploads = [
        (&auth.ca_cert_path, &auth.ca_cert_remote_path),
        (&auth.server_cert_path, &auth.server_cert_remote_path),
        (&auth.server_key_path, &auth.server_key_remote_path),
    ];
    for (local, remote) in uploads {
        let contents = fs::read(local).map_err(|e| CertError::io(local, e))?;
        shell.write_file(remote, &contents).await?;
    }

    let url = driver.get_url().await?;
    let (_, port) = engine_endpoint(&url)?;

    let config = provisioner.generate_docker_config(port, auth, driver.driver_name());
    shell
        .exec(&format!(
            "sudo mkdir -p {}",
            shell_quote(remote_parent(&config.engine_config_path))
        ))
        .await?;
    shell
        .write_file(&config.engine_config_path, config.engine_config.as_bytes())
        .await?;

    provisioner.service(shell, ServiceAction::Start).await?;
    tracing::info!("Configured TLS on {} (port {})", machine_name, port);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{setup_machine_certificates, verify_certificate};
    use crate::config::MachinePaths;
    use crate::driver::{DriverContext, State};
    use crate::provision::{Boot2DockerProvisioner, SystemdProvisioner, systemd};
    use crate::testing::{FakeCloud, FakeDriver, FakeShell};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        paths: MachinePaths,
        driver: FakeDriver,
        auth: AuthOptions,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let paths = MachinePaths::new(dir.path());
        setup_machine_certificates(&paths, "alice", 2048).unwrap();
        let store = paths.host_dir("web");
        let cloud = FakeCloud::new();
        cloud.set_state("web", State::Running);
        let driver = FakeDriver::new(
            DriverContext {
                machine_name: "web".to_string(),
                store_path: store.clone(),
                ca_cert_path: paths.ca_cert_path(),
                ca_key_path: paths.ca_key_path(),
            },
            cloud,
        );
        let auth = AuthOptions::for_host(&paths, &store);
        Fixture {
            _dir: dir,
            paths,
            driver,
            auth,
        }
    }

    #[test]
    fn test_engine_endpoint() {
        assert_eq!(
            engine_endpoint("tcp://10.0.0.5:2377").unwrap(),
            ("10.0.0.5".to_string(), 2377)
        );
        assert_eq!(
            engine_endpoint("tcp://node.example.com").unwrap(),
            ("node.example.com".to_string(), 2376)
        );
        assert!(engine_endpoint("not a url").is_err());
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent(systemd::DROP_IN_PATH), "/etc/systemd/system/docker.service.d");
        assert_eq!(remote_parent("/profile"), "/");
    }

    #[tokio::test]
    async fn test_uploads_ca_and_server_pair_only() {
        let mut fx = fixture();
        let shell = FakeShell::new();

        configure_auth(
            &SystemdProvisioner,
            &shell,
            &fx.driver,
            &mut fx.auth,
            &ProvisionSettings::default(),
        )
        .await
        .unwrap();

        let files = shell.files();
        let mut uploaded: Vec<&str> = files.keys().map(String::as_str).collect();
        uploaded.sort();
        assert_eq!(
            uploaded,
            vec![
                "/etc/docker/ca.pem",
                "/etc/docker/server-key.pem",
                "/etc/docker/server.pem",
                systemd::DROP_IN_PATH,
            ]
        );

        let ca_key = fs::read(fx.paths.ca_key_path()).unwrap();
        assert!(files.values().all(|contents| contents.as_bytes() != ca_key.as_slice()));

        assert!(verify_certificate(&fx.auth.server_cert_path, &fx.paths.ca_cert_path()).unwrap());
        for name in ["ca.pem", "cert.pem", "key.pem"] {
            assert!(fx.auth.store_path.join(name).exists(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_engine_stopped_before_upload_and_started_after() {
        let mut fx = fixture();
        let shell = FakeShell::new();

        configure_auth(
            &SystemdProvisioner,
            &shell,
            &fx.driver,
            &mut fx.auth,
            &ProvisionSettings::default(),
        )
        .await
        .unwrap();

        let commands = shell.commands();
        assert_eq!(commands.first().map(String::as_str), Some("sudo systemctl stop docker"));
        assert!(commands.last().unwrap().ends_with("sudo systemctl start docker"));
    }

    #[tokio::test]
    async fn test_port_comes_from_driver_url() {
        let mut fx = fixture();
        fx.driver.set_engine_port(12376);
        let shell = FakeShell::new();

        configure_auth(
            &Boot2DockerProvisioner,
            &shell,
            &fx.driver,
            &mut fx.auth,
            &ProvisionSettings::default(),
        )
        .await
        .unwrap();

        let profile = shell.file("/var/lib/boot2docker/profile").unwrap();
        assert!(profile.contains("-H tcp://0.0.0.0:12376"));
        assert_eq!(fx.auth.ca_cert_remote_path, "/var/lib/boot2docker/ca.pem");
    }

    #[tokio::test]
    async fn test_failed_stop_aborts_before_upload() {
        let mut fx = fixture();
        let shell = FakeShell::new();
        shell.fail("systemctl stop", 5, "Failed to stop docker.service");

        let err = configure_auth(
            &SystemdProvisioner,
            &shell,
            &fx.driver,
            &mut fx.auth,
            &ProvisionSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to stop docker.service"));
        assert!(shell.files().is_empty());
    }
}
