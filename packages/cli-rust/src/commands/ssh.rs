//! dockhand ssh - Log into a machine or run a command on it

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::App;

#[derive(Args)]
pub struct SshArgs {
    /// Machine name
    pub name: String,

    /// Command to run instead of an interactive session
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

pub async fn cmd_ssh(app: &App, args: &SshArgs) -> Result<()> {
    let host = app.resolve_host(Some(&args.name))?;
    let state = host.state().await?;
    if state != dockhand_core::State::Running {
        bail!("{} is not running (state: {})", host.name(), state);
    }

    let command = host.ssh_command(&args.command).await?;
    tracing::debug!("Running {:?}", command);
    let status = tokio::process::Command::from(command)
        .status()
        .await
        .context("Failed to run ssh")?;

    if !status.success() {
        match status.code() {
            Some(code) => bail!("ssh exited with status {code}"),
            None => bail!("ssh was terminated by a signal"),
        }
    }
    Ok(())
}
