//! Host management module
//!
//! A [`Host`] binds a machine name to the driver that controls it, the trust
//! material configured on it and its swarm membership. State is never cached
//! on the host; every query goes to the driver.

mod error;
mod lifecycle;
mod schema;
mod ssh;
mod storage;
mod wait;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use error::HostError;
pub use schema::{AuthOptions, HostRecord, SwarmOptions};
pub use ssh::{
    CommandOutput, RemoteShell, ShellError, ShellFactory, SshShell, SshShellFactory, SshTarget,
    build_ssh_command, shell_quote,
};
pub use storage::{CONFIG_FILE, load_host, save_host};
pub use wait::{WaitPolicy, wait_for_ssh, wait_for_state, wait_for_tcp};

use crate::config::Config;
use crate::driver::{Driver, State};
use crate::provision::{ProvisionSettings, ProvisionerRegistry};

/// Validate a machine name
///
/// Names are non-empty and use only ASCII letters, digits, `.` and `-`.
/// A leading `.` is reserved for store metadata such as `.ca` and `.active`.
pub fn validate_host_name(name: &str) -> Result<(), HostError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(HostError::InvalidName(name.to_string()))
    }
}

/// Collaborators shared by every host in a process
pub struct HostRuntime {
    pub shells: Arc<dyn ShellFactory>,
    pub provisioners: Arc<ProvisionerRegistry>,
    pub ssh_wait: WaitPolicy,
    pub engine_wait: WaitPolicy,
    /// Pause between state queries while waiting for start/stop
    pub state_poll_interval: Duration,
    pub key_bits: u32,
    pub swarm_image: String,
}

impl HostRuntime {
    pub fn from_config(config: &Config) -> Self {
        Self {
            shells: Arc::new(SshShellFactory),
            provisioners: Arc::new(ProvisionerRegistry::with_builtins()),
            ssh_wait: WaitPolicy::ssh(config),
            engine_wait: WaitPolicy::engine(config),
            state_poll_interval: config.retry_interval(),
            key_bits: config.key_bits,
            swarm_image: config.swarm_image.clone(),
        }
    }

    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            key_bits: self.key_bits,
            swarm_image: self.swarm_image.clone(),
            engine_wait: self.engine_wait,
        }
    }
}

impl std::fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRuntime")
            .field("provisioners", &self.provisioners)
            .field("ssh_wait", &self.ssh_wait)
            .field("engine_wait", &self.engine_wait)
            .field("key_bits", &self.key_bits)
            .field("swarm_image", &self.swarm_image)
            .finish()
    }
}

/// One managed machine
pub struct Host {
    name: String,
    driver: Box<dyn Driver>,
    pub auth_options: AuthOptions,
    pub swarm_options: SwarmOptions,
    store_path: PathBuf,
    runtime: Arc<HostRuntime>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl Host {
    /// Wrap a configured driver
    ///
    /// The store path is the driver's; the host never writes elsewhere.
    pub fn new(
        name: &str,
        driver: Box<dyn Driver>,
        auth_options: AuthOptions,
        swarm_options: SwarmOptions,
        runtime: Arc<HostRuntime>,
    ) -> Result<Self, HostError> {
        validate_host_name(name)?;
        let store_path = driver.store_path().to_path_buf();
        Ok(Self {
            name: name.to_string(),
            driver,
            auth_options,
            swarm_options,
            store_path,
            runtime,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn driver_name(&self) -> &str {
        self.driver.driver_name()
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn runtime(&self) -> &Arc<HostRuntime> {
        &self.runtime
    }

    pub async fn url(&self) -> Result<String, HostError> {
        Ok(self.driver.get_url().await?)
    }

    pub async fn ip(&self) -> Result<String, HostError> {
        Ok(self.driver.get_ip().await?)
    }

    /// Current state, straight from the driver
    pub async fn state(&self) -> Result<State, HostError> {
        Ok(self.driver.get_state().await?)
    }

    /// Persisted form of this host
    pub fn to_record(&self) -> Result<HostRecord, HostError> {
        Ok(HostRecord {
            name: self.name.clone(),
            driver_name: self.driver.driver_name().to_string(),
            driver: self.driver.save_config()?,
            auth_options: self.auth_options.clone(),
            swarm_options: self.swarm_options.clone(),
        })
    }

    pub fn save(&self) -> Result<(), HostError> {
        save_host(self)
    }

    /// How to reach this host over SSH
    pub async fn ssh_target(&self) -> Result<SshTarget, HostError> {
        Ok(SshTarget {
            hostname: self.driver.ssh_hostname().await?,
            port: self.driver.ssh_port(),
            user: self.driver.ssh_user(),
            key_path: self.driver.ssh_key_path(),
        })
    }

    /// Open a remote shell on this host
    pub async fn shell(&self) -> Result<Box<dyn RemoteShell>, HostError> {
        let target = self.ssh_target().await?;
        Ok(self.runtime.shells.connect(target))
    }

    /// `ssh` invocation for a user session
    ///
    /// Without arguments the session is interactive; with arguments they run
    /// as a one-shot command in batch mode.
    pub async fn ssh_command(&self, args: &[String]) -> Result<std::process::Command, HostError> {
        let target = self.ssh_target().await?;
        let mut cmd = build_ssh_command(&target, !args.is_empty());
        cmd.args(args);
        Ok(cmd)
    }
}
