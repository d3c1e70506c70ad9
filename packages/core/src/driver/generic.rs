//! Generic driver
//!
//! Adopts an existing machine that is already reachable over SSH. Nothing is
//! created or destroyed on the backend; the machine's power state is outside
//! this driver's control.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use super::error::DriverError;
use super::options::{DriverOptions, FlagSpec};
use super::ssh_config::query_ssh_config;
use super::{DEFAULT_ENGINE_PORT, Driver, DriverContext, State};

const DRIVER_NAME: &str = "generic";

/// How long a state check waits for the SSH port
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericConfig {
    pub ip_address: String,
    pub ssh_user: String,
    pub ssh_port: u16,
    #[serde(default)]
    pub ssh_key_path: Option<String>,
    pub engine_port: u16,
}

#[derive(Debug)]
pub struct GenericDriver {
    ctx: DriverContext,
    config: GenericConfig,
}

impl GenericDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self {
            ctx,
            config: GenericConfig {
                engine_port: DEFAULT_ENGINE_PORT,
                ssh_port: 22,
                ..Default::default()
            },
        }
    }

    pub fn config(&self) -> &GenericConfig {
        &self.config
    }

    pub fn create_flags() -> Vec<FlagSpec> {
        vec![
            FlagSpec::string("generic-ip-address", "IP address or hostname of the machine", "")
                .with_env("GENERIC_IP_ADDRESS"),
            FlagSpec::string(
                "generic-ssh-user",
                "SSH user (default: ~/.ssh/config, then the current user)",
                "",
            )
            .with_env("GENERIC_SSH_USER"),
            FlagSpec::int(
                "generic-ssh-port",
                "SSH port (default: ~/.ssh/config, then 22)",
                0,
            )
            .with_env("GENERIC_SSH_PORT"),
            FlagSpec::string(
                "generic-ssh-key",
                "SSH private key (default: ~/.ssh/config, then the SSH agent)",
                "",
            )
            .with_env("GENERIC_SSH_KEY"),
            FlagSpec::int(
                "generic-engine-port",
                "Docker engine port",
                i64::from(DEFAULT_ENGINE_PORT),
            )
            .with_env("GENERIC_ENGINE_PORT"),
        ]
    }

    fn unsupported(&self, operation: &'static str) -> DriverError {
        DriverError::not_supported(DRIVER_NAME, operation)
    }
}

fn port_option(opts: &dyn DriverOptions, key: &str) -> Result<Option<u16>, DriverError> {
    match opts.int(key) {
        0 => Ok(None),
        n => u16::try_from(n)
            .map(Some)
            .map_err(|_| DriverError::InvalidOption {
                option: key.to_string(),
                message: format!("{n} is not a valid port"),
            }),
    }
}

#[async_trait]
impl Driver for GenericDriver {
    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn context(&self) -> &DriverContext {
        &self.ctx
    }

    fn set_config_from_flags(&mut self, opts: &dyn DriverOptions) -> Result<(), DriverError> {
        let ip_address = opts.string("generic-ip-address");
        if ip_address.is_empty() {
            return Err(DriverError::missing_option(DRIVER_NAME, "generic-ip-address"));
        }

        let ssh_config = query_ssh_config(&ip_address)?;

        let user = opts.string("generic-ssh-user");
        let ssh_user = if !user.is_empty() {
            user
        } else {
            ssh_config.user.unwrap_or_else(whoami::username)
        };

        let ssh_port = port_option(opts, "generic-ssh-port")?
            .or(ssh_config.port)
            .unwrap_or(22);

        let key = opts.string("generic-ssh-key");
        let ssh_key_path = if !key.is_empty() {
            Some(key)
        } else {
            ssh_config.identity_file
        };

        let engine_port =
            port_option(opts, "generic-engine-port")?.unwrap_or(DEFAULT_ENGINE_PORT);

        self.config = GenericConfig {
            ip_address,
            ssh_user,
            ssh_port,
            ssh_key_path,
            engine_port,
        };
        Ok(())
    }

    async fn get_url(&self) -> Result<String, DriverError> {
        let ip = self.get_ip().await?;
        Ok(format!("tcp://{}:{}", ip, self.config.engine_port))
    }

    async fn get_ip(&self) -> Result<String, DriverError> {
        if self.config.ip_address.is_empty() {
            return Err(DriverError::missing_option(DRIVER_NAME, "generic-ip-address"));
        }
        Ok(self.config.ip_address.clone())
    }

    async fn get_state(&self) -> Result<State, DriverError> {
        let addr = format!("{}:{}", self.config.ip_address, self.config.ssh_port);
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(State::Running),
            Ok(Err(e)) => {
                tracing::debug!("{} not reachable: {}", addr, e);
                Ok(State::Stopped)
            }
            Err(_) => {
                tracing::debug!("connect to {} timed out", addr);
                Ok(State::Stopped)
            }
        }
    }

    async fn pre_create_check(&self) -> Result<(), DriverError> {
        if let Some(key) = &self.config.ssh_key_path {
            if !PathBuf::from(key).exists() {
                return Err(DriverError::InvalidOption {
                    option: "generic-ssh-key".to_string(),
                    message: format!("{key} does not exist"),
                });
            }
        }
        Ok(())
    }

    async fn create(&mut self) -> Result<(), DriverError> {
        tracing::info!(
            "Importing existing machine {} at {}",
            self.ctx.machine_name,
            self.config.ip_address
        );
        Ok(())
    }

    async fn remove(&self) -> Result<(), DriverError> {
        tracing::debug!(
            "Forgetting machine {}; nothing to remove on the backend",
            self.ctx.machine_name
        );
        Ok(())
    }

    async fn start(&self) -> Result<(), DriverError> {
        Err(self.unsupported("start"))
    }

    async fn stop(&self) -> Result<(), DriverError> {
        Err(self.unsupported("stop"))
    }

    async fn restart(&self) -> Result<(), DriverError> {
        Err(self.unsupported("restart"))
    }

    async fn kill(&self) -> Result<(), DriverError> {
        Err(self.unsupported("kill"))
    }

    fn ssh_port(&self) -> u16 {
        self.config.ssh_port
    }

    fn ssh_user(&self) -> String {
        self.config.ssh_user.clone()
    }

    fn ssh_key_path(&self) -> Option<PathBuf> {
        self.config.ssh_key_path.as_ref().map(PathBuf::from)
    }

    fn save_config(&self) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::to_value(&self.config)?)
    }

    fn load_config(&mut self, value: serde_json::Value) -> Result<(), DriverError> {
        self.config = serde_json::from_value(value)?;
        Ok(())
    }
}
