//! dockhand create - Create, start and provision a machine

use anyhow::{Result, bail};
use clap::Args;
use console::style;
use dockhand_core::driver::OptionBag;
use dockhand_core::host::SwarmOptions;

use crate::App;
use crate::output::{CommandSpinner, print_orphan_warning};

#[derive(Args)]
pub struct CreateArgs {
    /// Driver to create the machine with (see `dockhand drivers`)
    #[arg(short, long, env = "MACHINE_DRIVER")]
    pub driver: String,

    /// Driver option, repeatable
    #[arg(short = 'o', long = "opt", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub opts: Vec<(String, String)>,

    #[command(flatten)]
    pub swarm: SwarmArgs,

    /// Machine name
    pub name: String,
}

#[derive(Args)]
pub struct SwarmArgs {
    /// Join the machine to a swarm
    #[arg(long)]
    pub swarm: bool,

    /// Run the swarm manager on this machine
    #[arg(long)]
    pub swarm_master: bool,

    /// Discovery backend of the swarm, e.g. token://<id>
    #[arg(long, default_value = "")]
    pub swarm_discovery: String,

    /// Address the swarm agent advertises (default: the engine address)
    #[arg(long, default_value = "")]
    pub swarm_addr: String,

    /// Listen URL of the swarm manager
    #[arg(long, default_value = "tcp://0.0.0.0:3376")]
    pub swarm_host: String,
}

impl SwarmArgs {
    fn to_options(&self) -> Result<SwarmOptions> {
        if !self.swarm {
            if self.swarm_master {
                bail!("--swarm-master requires --swarm");
            }
            return Ok(SwarmOptions::default());
        }
        if self.swarm_discovery.is_empty() {
            bail!("--swarm-discovery is required with --swarm");
        }
        Ok(SwarmOptions {
            is_swarm: true,
            discovery: self.swarm_discovery.clone(),
            addr: self.swarm_addr.clone(),
            master: self.swarm_master,
            host: self.swarm_host.clone(),
        })
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

pub async fn cmd_create(app: &App, args: CreateArgs) -> Result<()> {
    let swarm = args.swarm.to_options()?;

    let flags = app.store().registry().flags_for(&args.driver)?;
    let mut options = OptionBag::from_flags(flags)?;
    for (key, value) in &args.opts {
        options.apply_override(flags, key, value)?;
    }

    let spinner = CommandSpinner::new_maybe(
        &format!("Creating {} with the {} driver...", args.name, args.driver),
        app.quiet,
    );

    match app
        .provider
        .create(&args.name, &args.driver, swarm, &options)
        .await
    {
        Ok(host) => {
            spinner.success(&format!("Created {}", host.name()));
            if !app.quiet {
                println!();
                println!(
                    "  {} {}",
                    style("Point your Docker client at it with:").dim(),
                    style(format!("eval \"$(dockhand env {})\"", host.name())).yellow()
                );
            }
            Ok(())
        }
        Err(e) => {
            spinner.fail(&format!("Failed to create {}", args.name));
            print_orphan_warning(&args.name, &args.driver, app.machine_exists(&args.name));
            Err(e.into())
        }
    }
}
