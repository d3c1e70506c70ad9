//! Cluster driver
//!
//! A "machine" that is a named set of existing hosts. Lifecycle calls fan out
//! to every member concurrently; a failing member is logged and does not fail
//! the cluster operation.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::DriverError;
use super::fanout::{FanOutPolicy, FanOutReport};
use super::options::{DriverOptions, FlagSpec};
use super::registry::DriverRegistry;
use super::{Driver, DriverContext, State};
use crate::config::MachinePaths;
use crate::host::{Host, HostRuntime};
use crate::store::{FileStore, Store};

const DRIVER_NAME: &str = "cluster";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Member machine names
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberAction {
    Start,
    Stop,
    Kill,
    Upgrade,
    Remove,
}

impl MemberAction {
    fn as_str(self) -> &'static str {
        match self {
            MemberAction::Start => "start",
            MemberAction::Stop => "stop",
            MemberAction::Kill => "kill",
            MemberAction::Upgrade => "upgrade",
            MemberAction::Remove => "remove",
        }
    }

    /// Members already in this state are skipped
    fn target_state(self) -> Option<State> {
        match self {
            MemberAction::Start => Some(State::Running),
            MemberAction::Stop => Some(State::Stopped),
            _ => None,
        }
    }
}

pub struct ClusterDriver {
    ctx: DriverContext,
    config: ClusterConfig,
    registry: Weak<DriverRegistry>,
    policy: FanOutPolicy,
    runtime: Arc<HostRuntime>,
}

impl std::fmt::Debug for ClusterDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterDriver")
            .field("machine_name", &self.ctx.machine_name)
            .field("nodes", &self.config.nodes)
            .finish()
    }
}

impl ClusterDriver {
    pub fn new(
        ctx: DriverContext,
        registry: Weak<DriverRegistry>,
        policy: FanOutPolicy,
        runtime: Arc<HostRuntime>,
    ) -> Self {
        Self {
            ctx,
            config: ClusterConfig::default(),
            registry,
            policy,
            runtime,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn create_flags() -> Vec<FlagSpec> {
        vec![FlagSpec::string_slice("cluster-node", "Cluster node (machine name)")]
    }

    /// Members live next to the cluster's own directory
    fn store(&self) -> Result<FileStore, DriverError> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| DriverError::Membership("driver registry is gone".to_string()))?;
        let machine_dir = self.ctx.store_path.parent().ok_or_else(|| {
            DriverError::Membership(format!(
                "{} has no parent directory",
                self.ctx.store_path.display()
            ))
        })?;
        Ok(FileStore::new(
            MachinePaths::from_machine_dir(machine_dir),
            registry,
            self.runtime.clone(),
        ))
    }

    fn members(&self) -> Result<Vec<Host>, DriverError> {
        let store = self.store()?;
        self.config
            .nodes
            .iter()
            .map(|name| {
                store
                    .load(name)
                    .map_err(|e| DriverError::Membership(format!("{name}: {e}")))
            })
            .collect()
    }

    async fn fan_out(&self, action: MemberAction) -> Result<FanOutReport, DriverError> {
        let members = self.members()?;

        let mut targets = Vec::with_capacity(members.len());
        let mut skipped = Vec::new();
        for host in members {
            let name = host.name().to_string();
            if let Some(target) = action.target_state() {
                match host.state().await {
                    Ok(state) if state == target => {
                        tracing::debug!("member {} already {}", name, state);
                        skipped.push(name);
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("unable to get state for member {}: {}", name, e);
                        skipped.push(name);
                        continue;
                    }
                }
            }
            targets.push((name, host));
        }

        let state_timeout = self.policy.member_state_timeout;
        let mut report = self
            .policy
            .dispatch(action.as_str(), targets, move |host: Host| async move {
                match action {
                    MemberAction::Start => host.start(state_timeout).await,
                    MemberAction::Stop => host.stop(state_timeout).await,
                    MemberAction::Kill => host.kill(state_timeout).await,
                    // Host::upgrade is deferred, so every member reports UpgradeDeferred
                    MemberAction::Upgrade => host.upgrade().await,
                    MemberAction::Remove => host.remove(false).await,
                }
            })
            .await;

        skipped.sort();
        report.skipped = skipped;
        tracing::info!(
            "{} on cluster {}: {} succeeded, {} failed, {} skipped",
            action.as_str(),
            self.ctx.machine_name,
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

#[async_trait]
impl Driver for ClusterDriver {
    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn context(&self) -> &DriverContext {
        &self.ctx
    }

    fn set_config_from_flags(&mut self, opts: &dyn DriverOptions) -> Result<(), DriverError> {
        let nodes = opts.string_slice("cluster-node");
        if nodes.is_empty() {
            return Err(DriverError::missing_option(DRIVER_NAME, "cluster-node"));
        }
        self.config = ClusterConfig { nodes };
        Ok(())
    }

    async fn get_url(&self) -> Result<String, DriverError> {
        Err(DriverError::not_supported(DRIVER_NAME, "url"))
    }

    async fn get_ip(&self) -> Result<String, DriverError> {
        Err(DriverError::not_supported(DRIVER_NAME, "ip"))
    }

    /// Running only if every member is Running
    ///
    /// Unresolved membership reports `State::Error` rather than failing.
    async fn get_state(&self) -> Result<State, DriverError> {
        let members = match self.members() {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!("cluster {}: {}", self.ctx.machine_name, e);
                return Ok(State::Error);
            }
        };

        for host in &members {
            match host.state().await {
                Ok(State::Running) => {}
                Ok(state) => {
                    tracing::debug!("member {} is {}", host.name(), state);
                    return Ok(State::Degraded);
                }
                Err(e) => {
                    tracing::debug!("member {} state unknown: {}", host.name(), e);
                    return Ok(State::Degraded);
                }
            }
        }
        Ok(State::Running)
    }

    async fn pre_create_check(&self) -> Result<(), DriverError> {
        if self.config.nodes.is_empty() {
            return Err(DriverError::missing_option(DRIVER_NAME, "cluster-node"));
        }
        if self
            .config
            .nodes
            .iter()
            .any(|node| node == &self.ctx.machine_name)
        {
            return Err(DriverError::Membership(
                "a cluster cannot contain itself".to_string(),
            ));
        }
        self.members().map(|_| ())
    }

    async fn create(&mut self) -> Result<(), DriverError> {
        tracing::info!(
            "Created cluster {} with {} members",
            self.ctx.machine_name,
            self.config.nodes.len()
        );
        Ok(())
    }

    async fn remove(&self) -> Result<(), DriverError> {
        self.fan_out(MemberAction::Remove).await.map(|_| ())
    }

    async fn start(&self) -> Result<(), DriverError> {
        self.fan_out(MemberAction::Start).await.map(|_| ())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.fan_out(MemberAction::Stop).await.map(|_| ())
    }

    async fn restart(&self) -> Result<(), DriverError> {
        self.fan_out(MemberAction::Stop).await?;
        self.fan_out(MemberAction::Start).await.map(|_| ())
    }

    async fn kill(&self) -> Result<(), DriverError> {
        self.fan_out(MemberAction::Kill).await.map(|_| ())
    }

    async fn upgrade(&self) -> Result<(), DriverError> {
        self.fan_out(MemberAction::Upgrade).await.map(|_| ())
    }

    fn requires_provisioning(&self) -> bool {
        false
    }

    fn save_config(&self) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::to_value(&self.config)?)
    }

    fn load_config(&mut self, value: serde_json::Value) -> Result<(), DriverError> {
        self.config = serde_json::from_value(value)?;
        Ok(())
    }
}
