//! Bounded waits for machines to become reachable or change state

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;

use super::error::HostError;
use super::ssh::{RemoteShell, ShellError};
use crate::config::Config;
use crate::driver::{Driver, State};

/// Fixed-interval retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    /// Pause between attempts
    pub interval: Duration,
}

impl WaitPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }

    pub fn ssh(config: &Config) -> Self {
        Self::new(config.ssh_max_retries, config.retry_interval())
    }

    pub fn engine(config: &Config) -> Self {
        Self::new(config.engine_max_retries, config.retry_interval())
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.interval).take(self.max_retries.saturating_sub(1) as usize)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(1))
    }
}

async fn check_ssh(shell: &dyn RemoteShell) -> Result<(), ShellError> {
    shell.reachable().await?;
    shell.exec("exit 0").await.map(|_| ())
}

/// Wait until the SSH port accepts connections and a trivial command runs
pub async fn wait_for_ssh(shell: &dyn RemoteShell, policy: &WaitPolicy) -> Result<(), HostError> {
    Retry::spawn(policy.strategy(), move || async move {
        check_ssh(shell).await.inspect_err(|e| {
            tracing::debug!("SSH not available yet: {}", e);
        })
    })
    .await
    .map_err(|e| HostError::SshTimeout {
        retries: policy.max_retries,
        last_error: e.to_string(),
    })
}

/// Wait until `addr` accepts TCP connections
pub async fn wait_for_tcp(addr: &str, policy: &WaitPolicy) -> Result<(), std::io::Error> {
    Retry::spawn(policy.strategy(), move || async move {
        TcpStream::connect(addr).await.map(|_| ()).inspect_err(|e| {
            tracing::debug!("{} not accepting connections yet: {}", addr, e);
        })
    })
    .await
}

/// Poll the driver until it reports `target`
///
/// Query errors are logged and polling continues. A fleet that settles as
/// `Degraded` ends the wait early since its members have already finished.
pub async fn wait_for_state(
    driver: &dyn Driver,
    target: State,
    timeout: Duration,
    interval: Duration,
) -> Result<(), HostError> {
    let poll = async {
        loop {
            match driver.get_state().await {
                Ok(state) if state == target => return Ok(()),
                Ok(State::Degraded) => return Err(HostError::Degraded { target }),
                Ok(state) => {
                    tracing::debug!("{} is {}, waiting for {}", driver.machine_name(), state, target)
                }
                Err(e) => tracing::debug!("Error getting machine state: {}", e),
            }
            tokio::time::sleep(interval).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| HostError::StateTimeout { target, timeout })?
}
