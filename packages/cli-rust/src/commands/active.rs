//! dockhand active - Print or set the active machine

use anyhow::{Result, bail};
use clap::Args;
use console::style;

use crate::App;

#[derive(Args)]
pub struct ActiveArgs {
    /// Make this machine the active one
    pub name: Option<String>,
}

pub fn cmd_active(app: &App, args: &ActiveArgs) -> Result<()> {
    if let Some(name) = &args.name {
        app.provider.set_active(name)?;
        if !app.quiet {
            println!("Active machine: {}", style(name).cyan());
        }
        return Ok(());
    }

    match app.provider.get_active()? {
        Some(host) => {
            println!("{}", host.name());
            Ok(())
        }
        None => bail!("No active host"),
    }
}
