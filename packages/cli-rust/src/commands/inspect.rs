//! dockhand inspect / ip / url

use anyhow::{Context, Result};

use super::HostArgs;
use crate::App;

/// Print the stored record as pretty JSON
pub fn cmd_inspect(app: &App, args: &HostArgs) -> Result<()> {
    let host = app.resolve_host(args.name.as_deref())?;
    let record = host.to_record()?;
    let json = serde_json::to_string_pretty(&record)
        .with_context(|| format!("Failed to serialize {}", host.name()))?;
    println!("{json}");
    Ok(())
}

pub async fn cmd_ip(app: &App, args: &HostArgs) -> Result<()> {
    let host = app.resolve_host(args.name.as_deref())?;
    println!("{}", host.ip().await?);
    Ok(())
}

pub async fn cmd_url(app: &App, args: &HostArgs) -> Result<()> {
    let host = app.resolve_host(args.name.as_deref())?;
    println!("{}", host.url().await?);
    Ok(())
}
