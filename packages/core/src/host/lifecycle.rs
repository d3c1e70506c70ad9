//! Host lifecycle operations

use std::fs;
use std::time::Duration;

use super::error::HostError;
use super::wait::{wait_for_ssh, wait_for_state};
use super::Host;
use crate::driver::State;
use crate::provision;

impl Host {
    /// Create the machine on its backend and bring it to a provisioned state
    ///
    /// The record is saved as soon as the backend resource exists, so a failed
    /// provisioning step still leaves something to `rm`.
    pub async fn create(&mut self) -> Result<(), HostError> {
        self.driver.pre_create_check().await?;

        tracing::info!("Creating {} with the {} driver", self.name, self.driver_name());
        self.driver.create().await?;
        self.save()?;

        if !self.driver.requires_provisioning() {
            return Ok(());
        }

        let shell = self.shell().await?;
        tracing::info!("Waiting for SSH on {}", self.name);
        wait_for_ssh(shell.as_ref(), &self.runtime.ssh_wait).await?;

        let provisioner = self.runtime.provisioners.detect(shell.as_ref()).await?;
        tracing::info!("Provisioning {} with {}", self.name, provisioner.name());
        provision::provision(
            provisioner.as_ref(),
            shell.as_ref(),
            self.driver.as_ref(),
            &mut self.auth_options,
            &self.swarm_options,
            &self.runtime.provision_settings(),
        )
        .await?;

        self.save()
    }

    pub async fn start(&self, timeout: Duration) -> Result<(), HostError> {
        self.driver.start().await?;
        self.save()?;
        self.wait_for(State::Running, timeout).await
    }

    pub async fn stop(&self, timeout: Duration) -> Result<(), HostError> {
        self.driver.stop().await?;
        self.save()?;
        self.wait_for(State::Stopped, timeout).await
    }

    pub async fn kill(&self, timeout: Duration) -> Result<(), HostError> {
        self.driver.kill().await?;
        self.save()?;
        self.wait_for(State::Stopped, timeout).await
    }

    /// Stop, wait for Stopped, start, wait for Running
    ///
    /// `timeout` bounds each of the two waits.
    pub async fn restart(&self, timeout: Duration) -> Result<(), HostError> {
        self.stop(timeout).await?;
        self.start(timeout).await?;
        self.save()
    }

    pub async fn upgrade(&self) -> Result<(), HostError> {
        Err(HostError::UpgradeDeferred)
    }

    /// Remove the backend resource and the local directory
    ///
    /// Without `force` a backend failure leaves local state in place so the
    /// removal can be retried. With `force` the failure is logged and the
    /// local directory goes anyway.
    pub async fn remove(&self, force: bool) -> Result<(), HostError> {
        if let Err(e) = self.driver.remove().await {
            if !force {
                return Err(e.into());
            }
            tracing::warn!(
                "Error removing {} from its backend, removing local files anyway: {}",
                self.name,
                e
            );
        }
        self.remove_store_path()
    }

    /// Regenerate and redistribute TLS material on a live host
    pub async fn configure_auth(&mut self) -> Result<(), HostError> {
        let shell = self.shell().await?;
        let provisioner = self.runtime.provisioners.detect(shell.as_ref()).await?;
        provision::configure_auth(
            provisioner.as_ref(),
            shell.as_ref(),
            self.driver.as_ref(),
            &mut self.auth_options,
            &self.runtime.provision_settings(),
        )
        .await?;
        self.save()
    }

    async fn wait_for(&self, target: State, timeout: Duration) -> Result<(), HostError> {
        wait_for_state(
            self.driver.as_ref(),
            target,
            timeout,
            self.runtime.state_poll_interval,
        )
        .await
    }

    fn remove_store_path(&self) -> Result<(), HostError> {
        match fs::metadata(&self.store_path) {
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(&self.store_path)?;
                tracing::debug!("Removed {}", self.store_path.display());
                Ok(())
            }
            Ok(_) => Err(HostError::Io(std::io::Error::other(format!(
                "{} is not a directory",
                self.store_path.display()
            )))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
