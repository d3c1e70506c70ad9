//! dockhand drivers - List drivers and the create options they accept

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};
use dockhand_core::driver::FlagSpec;

use crate::App;

#[derive(Args)]
pub struct DriversArgs {
    /// Show only the options of this driver
    pub driver: Option<String>,
}

pub fn cmd_drivers(app: &App, args: &DriversArgs) -> Result<()> {
    let registry = app.store().registry();

    let flags = match &args.driver {
        Some(name) => registry.flags_for(name)?.to_vec(),
        None => {
            if !app.quiet {
                println!("Drivers: {}", registry.driver_names().join(", "));
                println!();
            }
            registry.create_flags()
        }
    };

    if app.quiet {
        for flag in &flags {
            println!("{}", flag.name);
        }
        return Ok(());
    }

    println!("{}", render_flags(&flags));
    Ok(())
}

fn render_flags(flags: &[FlagSpec]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["OPTION", "TYPE", "DEFAULT", "ENV", "DESCRIPTION"]);
    for flag in flags {
        table.add_row(vec![
            Cell::new(flag.name),
            Cell::new(flag.default.kind()),
            Cell::new(flag.default.to_string()),
            Cell::new(flag.env_var.unwrap_or("")),
            Cell::new(flag.usage),
        ]);
    }
    table
}
