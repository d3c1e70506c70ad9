//! dockhand start / stop / restart / kill / upgrade / regenerate-certs
//!
//! Each command runs against every named machine in turn. A failure on one
//! machine is reported and the rest still run; the command fails at the end
//! if any machine did.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use dockhand_core::{Host, HostError};

use crate::App;
use crate::output::CommandSpinner;

#[derive(Args)]
pub struct LifecycleArgs {
    /// Machine names (default: the active machine)
    pub names: Vec<String>,

    /// How long to wait for the new state, e.g. "90s" or "5m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Args)]
pub struct NamesArgs {
    /// Machine names (default: the active machine)
    pub names: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    Restart,
    Kill,
}

impl LifecycleAction {
    fn progress(self) -> &'static str {
        match self {
            LifecycleAction::Start => "Starting",
            LifecycleAction::Stop => "Stopping",
            LifecycleAction::Restart => "Restarting",
            LifecycleAction::Kill => "Killing",
        }
    }

    fn done(self) -> &'static str {
        match self {
            LifecycleAction::Start => "Started",
            LifecycleAction::Stop => "Stopped",
            LifecycleAction::Restart => "Restarted",
            LifecycleAction::Kill => "Killed",
        }
    }

    async fn apply(self, host: &Host, timeout: Duration) -> Result<(), HostError> {
        match self {
            LifecycleAction::Start => host.start(timeout).await,
            LifecycleAction::Stop => host.stop(timeout).await,
            LifecycleAction::Restart => host.restart(timeout).await,
            LifecycleAction::Kill => host.kill(timeout).await,
        }
    }
}

/// Fail with a summary when any machine failed
fn summarize(action: &str, failed: &[String], total: usize) -> Result<()> {
    if failed.is_empty() {
        return Ok(());
    }
    bail!(
        "{action} failed on {} of {} machine(s): {}",
        failed.len(),
        total,
        failed.join(", ")
    )
}

pub async fn cmd_lifecycle(app: &App, args: &LifecycleArgs, action: LifecycleAction) -> Result<()> {
    let hosts = app.resolve_hosts(&args.names)?;
    let timeout = args.timeout.unwrap_or_else(|| app.config.state_timeout());

    let mut failed = Vec::new();
    for host in &hosts {
        let spinner = CommandSpinner::new_maybe(
            &format!("{} {}...", action.progress(), host.name()),
            app.quiet,
        );
        match action.apply(host, timeout).await {
            Ok(()) => spinner.success(&format!("{} {}", action.done(), host.name())),
            Err(e) => {
                spinner.fail(&format!("{} {} failed", action.progress(), host.name()));
                tracing::error!("{} {}: {}", action.progress(), host.name(), e);
                eprintln!("  {}: {}", host.name(), e);
                failed.push(host.name().to_string());
            }
        }
    }
    summarize(action.progress(), &failed, hosts.len())
}

pub async fn cmd_upgrade(app: &App, args: &NamesArgs) -> Result<()> {
    let hosts = app.resolve_hosts(&args.names)?;
    let mut failed = Vec::new();
    for host in &hosts {
        if let Err(e) = host.upgrade().await {
            eprintln!("  {}: {}", host.name(), e);
            failed.push(host.name().to_string());
        }
    }
    summarize("Upgrade", &failed, hosts.len())
}

pub async fn cmd_regenerate_certs(app: &App, args: &NamesArgs) -> Result<()> {
    let hosts = app.resolve_hosts(&args.names)?;
    let total = hosts.len();
    let mut failed = Vec::new();
    for mut host in hosts {
        let spinner = CommandSpinner::new_maybe(
            &format!("Regenerating TLS certificates for {}...", host.name()),
            app.quiet,
        );
        match host.configure_auth().await {
            Ok(()) => spinner.success(&format!("New certificates installed on {}", host.name())),
            Err(e) => {
                spinner.fail(&format!("Could not regenerate certificates for {}", host.name()));
                eprintln!("  {}: {}", host.name(), e);
                failed.push(host.name().to_string());
            }
        }
    }
    summarize("Certificate regeneration", &failed, total)
}
