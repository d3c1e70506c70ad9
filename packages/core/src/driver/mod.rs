//! Backend drivers
//!
//! A driver knows how to create and control machines on one backend. Every
//! driver implements the full [`Driver`] contract; operations a backend has no
//! meaning for return [`DriverError::NotSupported`] instead of failing in some
//! other way.
//!
//! Drivers describe how to reach their machine over SSH but never run remote
//! commands themselves. That is the provisioner's job.

pub mod cloud_init;
mod cluster;
mod error;
mod fanout;
mod generic;
mod options;
mod registry;
mod rivet;
mod ssh_config;
mod ssh_key;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cluster::{ClusterConfig, ClusterDriver};
pub use error::DriverError;
pub use fanout::{FanOutPolicy, FanOutReport};
pub use generic::{GenericConfig, GenericDriver};
pub use options::{DriverOptions, FlagSpec, FlagValue, OptionBag};
pub use registry::{DriverFactory, DriverRegistry};
pub use rivet::{RivetConfig, RivetDriver};
pub use ssh_key::generate_ssh_key;

/// Default engine configuration directory on provisioned hosts
pub const DEFAULT_DOCKER_CONFIG_DIR: &str = "/etc/docker";

/// Default TLS-verified engine port
pub const DEFAULT_ENGINE_PORT: u16 = 2376;

/// Machine state as reported by a driver
///
/// `Degraded` is only reported by fleet drivers. `Error` means the state query
/// itself failed, not that the machine is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    None,
    Starting,
    Running,
    Stopped,
    Degraded,
    Error,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::None => "",
            State::Starting => "Starting",
            State::Running => "Running",
            State::Stopped => "Stopped",
            State::Degraded => "Degraded",
            State::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// Everything a driver constructor receives
#[derive(Debug, Clone, PartialEq)]
pub struct DriverContext {
    pub machine_name: String,
    /// Per-machine directory, `<machine dir>/<name>`
    pub store_path: PathBuf,
    pub ca_cert_path: PathBuf,
    pub ca_key_path: PathBuf,
}

/// Engine daemon options and where they live on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerConfig {
    pub engine_config: String,
    pub engine_config_path: String,
}

/// Lifecycle contract implemented by every backend
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Name this driver is registered under
    fn driver_name(&self) -> &'static str;

    fn context(&self) -> &DriverContext;

    fn machine_name(&self) -> &str {
        &self.context().machine_name
    }

    fn store_path(&self) -> &Path {
        &self.context().store_path
    }

    fn ca_cert_path(&self) -> &Path {
        &self.context().ca_cert_path
    }

    fn ca_key_path(&self) -> &Path {
        &self.context().ca_key_path
    }

    /// Configure from user-supplied options; fails if a required one is missing
    fn set_config_from_flags(&mut self, opts: &dyn DriverOptions) -> Result<(), DriverError>;

    /// Docker-compatible URL, e.g. `tcp://1.2.3.4:2376`
    async fn get_url(&self) -> Result<String, DriverError>;

    /// IP or hostname the machine is reachable at
    async fn get_ip(&self) -> Result<String, DriverError>;

    async fn get_state(&self) -> Result<State, DriverError>;

    /// Side-effect-free precondition check, run before `create`
    async fn pre_create_check(&self) -> Result<(), DriverError>;

    async fn create(&mut self) -> Result<(), DriverError>;
    async fn remove(&self) -> Result<(), DriverError>;
    async fn start(&self) -> Result<(), DriverError>;
    async fn stop(&self) -> Result<(), DriverError>;
    async fn restart(&self) -> Result<(), DriverError>;
    async fn kill(&self) -> Result<(), DriverError>;

    async fn upgrade(&self) -> Result<(), DriverError> {
        Err(DriverError::not_supported(self.driver_name(), "upgrade"))
    }

    fn docker_config_dir(&self) -> &str {
        DEFAULT_DOCKER_CONFIG_DIR
    }

    async fn ssh_hostname(&self) -> Result<String, DriverError> {
        self.get_ip().await
    }

    fn ssh_port(&self) -> u16 {
        22
    }

    fn ssh_user(&self) -> String {
        "root".to_string()
    }

    fn ssh_key_path(&self) -> Option<PathBuf> {
        None
    }

    /// Whether `Host::create` should wait for SSH and run a provisioner
    fn requires_provisioning(&self) -> bool {
        true
    }

    /// Serialize the backend-specific configuration
    fn save_config(&self) -> Result<serde_json::Value, DriverError>;

    /// Restore configuration written by `save_config`
    fn load_config(&mut self, value: serde_json::Value) -> Result<(), DriverError>;
}
