//! dockhand rm - Remove machines from their backend and from disk

use anyhow::{Result, bail};
use clap::Args;

use crate::App;
use crate::output::CommandSpinner;

#[derive(Args)]
pub struct RmArgs {
    /// Machine names
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Remove local files even if the backend refuses to delete the machine
    #[arg(short, long)]
    pub force: bool,
}

pub async fn cmd_rm(app: &App, args: &RmArgs) -> Result<()> {
    let mut failed = Vec::new();
    for name in &args.names {
        let spinner = CommandSpinner::new_maybe(&format!("Removing {name}..."), app.quiet);
        match app.provider.remove(name, args.force).await {
            Ok(()) => spinner.success(&format!("Removed {name}")),
            Err(e) => {
                spinner.fail(&format!("Could not remove {name}"));
                eprintln!("  {name}: {e}");
                if !args.force {
                    eprintln!("  Retry with --force to remove the local files anyway.");
                }
                failed.push(name.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!("Could not remove: {}", failed.join(", "));
    }
    Ok(())
}
