//! Provisioning
//!
//! Turns a freshly created machine into a TLS-secured Docker engine, optionally
//! joined to a swarm. Everything happens over a [`RemoteShell`]; the driver is
//! only consulted for the machine's name, address and engine URL.
//!
//! Pipeline: set hostname, install the engine, configure TLS, join the swarm.
//! The first failing step aborts the rest.

mod auth;
mod boot2docker;
mod error;
mod os_release;
mod swarm;
pub mod systemd;

use std::sync::Arc;

use async_trait::async_trait;

pub use auth::configure_auth;
pub use boot2docker::Boot2DockerProvisioner;
pub use error::ProvisionError;
pub use os_release::{DistroFamily, OsRelease};
pub use swarm::configure_swarm;
pub use systemd::SystemdProvisioner;

use crate::driver::{DockerConfig, Driver};
use crate::host::{AuthOptions, RemoteShell, SwarmOptions, WaitPolicy};

/// Installs the engine unless a `docker` binary is already on the path
pub const INSTALL_COMMAND: &str =
    "if ! command -v docker >/dev/null 2>&1; then curl -sSL https://get.docker.com | sh -; fi";

/// Engine service actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}

/// Tunables for one provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// RSA key size for the server certificate
    pub key_bits: u32,
    pub swarm_image: String,
    /// Budget for the engine port to come up before swarm setup
    pub engine_wait: WaitPolicy,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            key_bits: 2048,
            swarm_image: "swarm:latest".to_string(),
            engine_wait: WaitPolicy::default(),
        }
    }
}

/// OS-specific provisioning steps
#[async_trait]
pub trait Provisioner: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn compatible_with(&self, os: &OsRelease) -> bool;

    /// Where the engine's TLS material lives on the host
    fn docker_config_dir(&self) -> &'static str;

    async fn set_hostname(
        &self,
        shell: &dyn RemoteShell,
        hostname: &str,
    ) -> Result<(), ProvisionError>;

    /// Control the Docker engine service
    async fn service(
        &self,
        shell: &dyn RemoteShell,
        action: ServiceAction,
    ) -> Result<(), ProvisionError>;

    /// Daemon options enabling TLS on `port`, and the file they go in
    fn generate_docker_config(
        &self,
        port: u16,
        auth: &AuthOptions,
        driver_name: &str,
    ) -> DockerConfig;
}

/// Engine flags shared by every provisioner
pub fn daemon_options(
    ca_cert: &str,
    server_cert: &str,
    server_key: &str,
    listen_host: &str,
    driver_name: &str,
) -> String {
    format!(
        "--tlsverify --tlscacert={ca_cert} --tlscert={server_cert} --tlskey={server_key} \
         -H {listen_host} -H unix:///var/run/docker.sock --label=provider={driver_name}"
    )
}

/// Run the full pipeline
pub async fn provision(
    provisioner: &dyn Provisioner,
    shell: &dyn RemoteShell,
    driver: &dyn Driver,
    auth: &mut AuthOptions,
    swarm: &SwarmOptions,
    settings: &ProvisionSettings,
) -> Result<(), ProvisionError> {
    provisioner
        .set_hostname(shell, driver.machine_name())
        .await?;
    install_engine(shell).await?;
    configure_auth(provisioner, shell, driver, auth, settings).await?;
    configure_swarm(provisioner, shell, driver, swarm, settings).await
}

/// Install the engine if it is missing
pub async fn install_engine(shell: &dyn RemoteShell) -> Result<(), ProvisionError> {
    tracing::info!("Installing Docker...");
    let output = shell.run(INSTALL_COMMAND).await?;
    if !output.success() {
        return Err(ProvisionError::Install {
            output: output.combined(),
        });
    }
    Ok(())
}

/// Constructor for one provisioner type
pub type ProvisionerFactory = Arc<dyn Fn() -> Box<dyn Provisioner> + Send + Sync>;

/// Ordered provisioner candidates
///
/// Detection returns the first registered provisioner compatible with the
/// remote OS, so more specific provisioners register first.
#[derive(Default)]
pub struct ProvisionerRegistry {
    factories: Vec<(String, ProvisionerFactory)>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let factories: Vec<(String, ProvisionerFactory)> = vec![
            (
                "boot2docker".to_string(),
                Arc::new(|| Box::new(Boot2DockerProvisioner) as Box<dyn Provisioner>),
            ),
            (
                "systemd".to_string(),
                Arc::new(|| Box::new(SystemdProvisioner) as Box<dyn Provisioner>),
            ),
        ];
        Self { factories }
    }

    /// Append a candidate; fails if the name is taken
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<(), ProvisionError>
    where
        F: Fn() -> Box<dyn Provisioner> + Send + Sync + 'static,
    {
        if self.factories.iter().any(|(n, _)| n == name) {
            return Err(ProvisionError::AlreadyRegistered(name.to_string()));
        }
        self.factories.push((name.to_string(), Arc::new(factory)));
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Pick a provisioner for the OS behind `shell`
    pub async fn detect(
        &self,
        shell: &dyn RemoteShell,
    ) -> Result<Box<dyn Provisioner>, ProvisionError> {
        let content = shell.exec("cat /etc/os-release").await?;
        let os = OsRelease::parse(&content)?;
        tracing::debug!("Detected OS: {} ({})", os, os.family);

        for (name, factory) in &self.factories {
            let provisioner = factory();
            if provisioner.compatible_with(&os) {
                tracing::debug!("Using provisioner {}", name);
                return Ok(provisioner);
            }
        }
        Err(ProvisionError::UnknownOs(os.to_string()))
    }
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerRegistry")
            .field("provisioners", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeShell;

    #[test]
    fn test_daemon_options_enable_tls() {
        let opts = daemon_options(
            "/etc/docker/ca.pem",
            "/etc/docker/server.pem",
            "/etc/docker/server-key.pem",
            "tcp://0.0.0.0:2376",
            "rivet",
        );
        assert!(opts.starts_with("--tlsverify --tlscacert=/etc/docker/ca.pem"));
        assert!(opts.contains("--tlskey=/etc/docker/server-key.pem"));
        assert!(opts.contains("-H tcp://0.0.0.0:2376 -H unix:///var/run/docker.sock"));
        assert!(opts.ends_with("--label=provider=rivet"));
    }

    #[tokio::test]
    async fn test_detect_prefers_first_compatible() {
        let registry = ProvisionerRegistry::with_builtins();
        let shell = FakeShell::new();

        shell.set_os_release("ID=boot2docker\n");
        assert_eq!(registry.detect(&shell).await.unwrap().name(), "boot2docker");

        shell.set_os_release("ID=fedora\nPRETTY_NAME=\"Fedora 39\"\n");
        assert_eq!(registry.detect(&shell).await.unwrap().name(), "systemd");
    }

    #[tokio::test]
    async fn test_detect_unknown_os() {
        let registry = ProvisionerRegistry::with_builtins();
        let shell = FakeShell::new();
        shell.set_os_release("ID=alpine\nPRETTY_NAME=\"Alpine Linux v3.19\"\n");

        let err = registry.detect(&shell).await.unwrap_err();
        assert!(matches!(err, ProvisionError::UnknownOs(ref os) if os == "Alpine Linux v3.19"));
    }

    #[test]
    fn test_duplicate_provisioner_is_rejected() {
        let mut registry = ProvisionerRegistry::with_builtins();
        let err = registry
            .register("systemd", || Box::new(SystemdProvisioner))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::AlreadyRegistered(_)));
        assert_eq!(registry.names(), vec!["boot2docker", "systemd"]);
    }

    #[tokio::test]
    async fn test_install_failure_carries_output() {
        let shell = FakeShell::new();
        shell.fail("get.docker.com", 1, "curl: (6) Could not resolve host");

        let err = install_engine(&shell).await.unwrap_err();
        assert!(err.to_string().contains("Could not resolve host"));
    }
}
