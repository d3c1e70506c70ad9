//! dockhand status - State, URL and engine version of one machine
//!
//! The engine is contacted over mutual TLS with the local client
//! certificate, which also proves the trust setup works end to end.

use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use dockhand_core::engine::engine_version;
use dockhand_core::{Host, State};

use super::HostArgs;
use crate::App;
use crate::output::{state_color, state_style};

/// Show the status of one machine
///
/// In quiet mode only the state is printed, and the command fails unless
/// the machine is running.
pub async fn cmd_status(app: &App, args: &HostArgs) -> Result<()> {
    let host = app.resolve_host(args.name.as_deref())?;
    let state = host.state().await?;

    if app.quiet {
        println!("{}", state_style(state));
        if state != State::Running {
            anyhow::bail!("{} is {}", host.name(), state);
        }
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Key", "Value"]);
    table.add_row(vec![Cell::new("Name"), Cell::new(host.name())]);
    table.add_row(vec![Cell::new("Driver"), Cell::new(host.driver_name())]);
    table.add_row(vec![
        Cell::new("State"),
        Cell::new(state.to_string()).fg(state_color(state)),
    ]);

    if state == State::Running {
        add_engine_rows(app, &host, &mut table).await;
    }

    let swarm = &host.swarm_options;
    if swarm.is_swarm {
        let role = if swarm.master { "master" } else { "member" };
        table.add_row(vec![
            Cell::new("Swarm"),
            Cell::new(format!("{} ({role})", swarm.discovery)),
        ]);
    }

    println!("{table}");
    Ok(())
}

async fn add_engine_rows(app: &App, host: &Host, table: &mut Table) {
    let url = match host.url().await {
        Ok(url) => url,
        Err(e) => {
            table.add_row(vec![Cell::new("URL"), Cell::new(e.to_string()).fg(Color::Red)]);
            return;
        }
    };
    table.add_row(vec![Cell::new("URL"), Cell::new(&url)]);

    let cert_dir = app.store().paths().client_cert_dir();
    let engine = match engine_version(&url, &cert_dir).await {
        Ok(info) => Cell::new(info.to_string()),
        Err(e) => Cell::new(e.to_string()).fg(Color::Red),
    };
    table.add_row(vec![Cell::new("Engine"), engine]);
}
