//! dockhand ls - List machines with their state and URL

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, Table};
use console::style;
use dockhand_core::HostListItem;

use crate::App;
use crate::output::state_color;

#[derive(Args)]
pub struct LsArgs {
    /// Show only machine names (for scripting)
    #[arg(long)]
    pub names_only: bool,
}

pub async fn cmd_ls(app: &App, args: &LsArgs) -> Result<()> {
    let items = app.provider.list_items().await?;

    if items.is_empty() {
        if !app.quiet && !args.names_only {
            println!("No machines.");
            println!();
            println!(
                "  {} {}",
                style("Create one with:").dim(),
                style("dockhand create -d <driver> <name>").yellow()
            );
        }
        return Ok(());
    }

    if args.names_only || app.quiet {
        for item in &items {
            println!("{}", item.name);
        }
        return Ok(());
    }

    println!("{}", render_table(&items));
    Ok(())
}

fn render_table(items: &[HostListItem]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["NAME", "ACTIVE", "DRIVER", "STATE", "URL", "SWARM", "ERRORS"]);

    for item in items {
        let name = if item.active {
            Cell::new(&item.name).fg(Color::Cyan)
        } else {
            Cell::new(&item.name)
        };
        table.add_row(vec![
            name,
            Cell::new(if item.active { "*" } else { "-" }),
            Cell::new(&item.driver_name),
            Cell::new(item.state.to_string()).fg(state_color(item.state)),
            Cell::new(&item.url),
            Cell::new(&item.swarm),
            Cell::new(item.error.as_deref().unwrap_or("")).fg(Color::Red),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockhand_core::State;

    fn item(name: &str, active: bool, state: State, url: &str) -> HostListItem {
        HostListItem {
            name: name.to_string(),
            active,
            driver_name: "generic".to_string(),
            state,
            url: url.to_string(),
            swarm: String::new(),
            error: None,
        }
    }

    #[test]
    fn table_marks_active_machine() {
        let table = render_table(&[
            item("db", false, State::Stopped, ""),
            item("web", true, State::Running, "tcp://10.0.0.5:2376"),
        ])
        .to_string();

        assert!(table.contains("tcp://10.0.0.5:2376"));
        let web_row = table.lines().find(|l| l.contains("web")).unwrap();
        assert!(web_row.contains('*'));
        let db_row = table.lines().find(|l| l.contains("db")).unwrap();
        assert!(db_row.contains("Stopped"));
    }

    #[test]
    fn table_shows_query_errors() {
        let mut broken = item("edge", false, State::Error, "");
        broken.error = Some("Unauthorized".to_string());
        let table = render_table(&[broken]).to_string();
        assert!(table.contains("Unauthorized"));
    }
}
