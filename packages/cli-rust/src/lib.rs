//! dockhand CLI - Create and manage TLS-secured Docker hosts
//!
//! This module contains the CLI implementation used by the `dockhand` binary.

mod commands;
mod output;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use console::style;
use dockhand_core::driver::FanOutPolicy;
use dockhand_core::{
    Config, DriverRegistry, FileStore, Host, HostRuntime, MachinePaths, Provider, Store, config,
    get_version, get_version_long, load_config,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub use output::print_error;

/// How long in-flight fleet tasks get to report after Ctrl-C
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Create and manage TLS-secured Docker hosts
#[derive(Parser)]
#[command(name = "dockhand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Create and manage TLS-secured Docker hosts", long_about = None)]
#[command(after_help = get_banner())]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Machine directory (default: ~/.docker/machines, or $MACHINE_DIR/.docker/machines)
    #[arg(short, long, global = true, env = "MACHINE_STORAGE_PATH")]
    storage_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a machine
    Create(commands::CreateArgs),
    /// List machines
    Ls(commands::LsArgs),
    /// Print or set the active machine
    Active(commands::ActiveArgs),
    /// Print the stored record of a machine as JSON
    Inspect(commands::HostArgs),
    /// Print the IP address of a machine
    Ip(commands::HostArgs),
    /// Print the engine URL of a machine
    Url(commands::HostArgs),
    /// Print the Docker client flags for a machine
    Config(commands::HostArgs),
    /// Print the environment that points the Docker client at a machine
    Env(commands::EnvArgs),
    /// Log into a machine or run a command on it
    Ssh(commands::SshArgs),
    /// Start machines
    Start(commands::LifecycleArgs),
    /// Stop machines
    Stop(commands::LifecycleArgs),
    /// Restart machines
    Restart(commands::LifecycleArgs),
    /// Forcefully stop machines
    Kill(commands::LifecycleArgs),
    /// Upgrade the engine on machines
    Upgrade(commands::NamesArgs),
    /// Issue new TLS certificates for machines
    RegenerateCerts(commands::NamesArgs),
    /// Remove machines
    Rm(commands::RmArgs),
    /// Show the state and engine version of a machine
    Status(commands::HostArgs),
    /// List drivers and their create options
    Drivers(commands::DriversArgs),
    /// Show or change dockhand settings
    Settings(commands::SettingsArgs),
}

/// Get the ASCII banner for help display
fn get_banner() -> &'static str {
    r#"
     _            _    _                     _
  __| | ___   ___| | _| |__   __ _ _ __   __| |
 / _` |/ _ \ / __| |/ / '_ \ / _` | '_ \ / _` |
| (_| | (_) | (__|   <| | | | (_| | | | | (_| |
 \__,_|\___/ \___|_|\_\_| |_|\__,_|_| |_|\__,_|
"#
}

/// Everything a command needs, built once per invocation
pub(crate) struct App {
    pub provider: Provider,
    pub config: Config,
    pub quiet: bool,
}

impl App {
    fn new(
        config: Config,
        storage_path: Option<PathBuf>,
        cancel: CancellationToken,
        quiet: bool,
    ) -> Result<Self> {
        let paths = match storage_path {
            Some(dir) => MachinePaths::from_machine_dir(dir),
            None => MachinePaths::from_env()
                .ok_or_else(|| anyhow!("Could not determine the machine directory; set MACHINE_DIR"))?,
        };
        tracing::debug!("Machine directory: {}", paths.machine_dir().display());

        let runtime = Arc::new(HostRuntime::from_config(&config));
        let policy = FanOutPolicy {
            max_concurrency: config.fleet_max_concurrency,
            task_timeout: config.fleet_task_timeout(),
            member_state_timeout: config.state_timeout(),
            cancel,
        };
        let registry = DriverRegistry::with_builtins(policy, runtime.clone())
            .context("Failed to register drivers")?;

        Ok(Self {
            provider: Provider::new(FileStore::new(paths, registry, runtime)),
            config,
            quiet,
        })
    }

    /// The named host, or the active one when no name is given
    pub fn resolve_host(&self, name: Option<&str>) -> Result<Host> {
        if let Some(name) = name {
            return Ok(self.provider.get(name)?);
        }
        self.provider.get_active()?.ok_or_else(|| {
            anyhow!("No active host. Pass a machine name or run `dockhand active <name>` first")
        })
    }

    /// Hosts for a multi-name command; the active host when none are named
    pub fn resolve_hosts(&self, names: &[String]) -> Result<Vec<Host>> {
        if names.is_empty() {
            return Ok(vec![self.resolve_host(None)?]);
        }
        names.iter().map(|name| Ok(self.provider.get(name)?)).collect()
    }

    pub fn store(&self) -> &FileStore {
        self.provider.store()
    }

    pub fn machine_exists(&self, name: &str) -> bool {
        self.store().exists(name)
    }
}

/// Default log level for a `-v` count
fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` wins over the `-v` flags when set
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel in-flight fleet work on Ctrl-C
///
/// After the first interrupt the command gets a short grace period to
/// collect its fleet report; a second interrupt exits immediately.
fn watch_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{} Interrupted, cancelling in-flight operations",
            style("Warning:").yellow().bold()
        );
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

async fn run_interruptible<F>(cancel: &CancellationToken, command: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        result = command => result,
        _ = async {
            cancel.cancelled().await;
            tokio::time::sleep(INTERRUPT_GRACE).await;
        } => Err(anyhow!("Interrupted")),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let config_path = config::get_config_path()
        .ok_or_else(|| anyhow!("Could not determine config path"))?;

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Configuration error", style("Error:").red().bold());
            eprintln!();
            eprintln!("  {e:#}");
            eprintln!();
            eprintln!("  Config file: {}", style(config_path.display()).yellow());
            eprintln!();
            eprintln!(
                "  {} Check the config file for syntax errors or unknown fields.",
                style("Tip:").cyan()
            );
            std::process::exit(1);
        }
    };

    if cli.verbose > 0 {
        eprintln!(
            "{} Config: {}",
            style("[info]").cyan(),
            config_path.display()
        );
    }

    let Some(command) = cli.command else {
        if !cli.quiet {
            println!(
                "{} {}",
                style("dockhand").cyan().bold(),
                style(if cli.verbose > 0 {
                    get_version_long()
                } else {
                    get_version()
                })
                .dim()
            );
            println!();
            println!("Run {} for available commands.", style("--help").green());
        }
        return Ok(());
    };

    if let Commands::Settings(args) = command {
        return commands::cmd_settings(args, &config, cli.quiet);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let app = App::new(config, cli.storage_path, cancel.clone(), cli.quiet)?;
        watch_interrupt(cancel.clone());
        run_interruptible(&cancel, dispatch(command, &app)).await
    })
}

async fn dispatch(command: Commands, app: &App) -> Result<()> {
    use commands::LifecycleAction;

    match command {
        Commands::Create(args) => commands::cmd_create(app, args).await,
        Commands::Ls(args) => commands::cmd_ls(app, &args).await,
        Commands::Active(args) => commands::cmd_active(app, &args),
        Commands::Inspect(args) => commands::cmd_inspect(app, &args),
        Commands::Ip(args) => commands::cmd_ip(app, &args).await,
        Commands::Url(args) => commands::cmd_url(app, &args).await,
        Commands::Config(args) => commands::cmd_config(app, &args).await,
        Commands::Env(args) => commands::cmd_env(app, &args).await,
        Commands::Ssh(args) => commands::cmd_ssh(app, &args).await,
        Commands::Start(args) => commands::cmd_lifecycle(app, &args, LifecycleAction::Start).await,
        Commands::Stop(args) => commands::cmd_lifecycle(app, &args, LifecycleAction::Stop).await,
        Commands::Restart(args) => {
            commands::cmd_lifecycle(app, &args, LifecycleAction::Restart).await
        }
        Commands::Kill(args) => commands::cmd_lifecycle(app, &args, LifecycleAction::Kill).await,
        Commands::Upgrade(args) => commands::cmd_upgrade(app, &args).await,
        Commands::RegenerateCerts(args) => commands::cmd_regenerate_certs(app, &args).await,
        Commands::Rm(args) => commands::cmd_rm(app, &args).await,
        Commands::Status(args) => commands::cmd_status(app, &args).await,
        Commands::Drivers(args) => commands::cmd_drivers(app, &args),
        Commands::Settings(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(default_log_level(0), "warn");
        assert_eq!(default_log_level(1), "info");
        assert_eq!(default_log_level(2), "debug");
        assert_eq!(default_log_level(7), "trace");
    }

    #[test]
    fn create_parses_repeated_options() {
        let cli = Cli::try_parse_from([
            "dockhand",
            "create",
            "-d",
            "generic",
            "-o",
            "generic-ip-address=10.0.0.5",
            "-o",
            "generic-ssh-user=ops",
            "web",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Create(args)) => {
                assert_eq!(args.driver, "generic");
                assert_eq!(args.name, "web");
                assert_eq!(args.opts.len(), 2);
                assert_eq!(args.opts[1], ("generic-ssh-user".to_string(), "ops".to_string()));
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn lifecycle_timeout_is_humantime() {
        let cli = Cli::try_parse_from(["dockhand", "stop", "--timeout", "2m 30s", "web"]).unwrap();
        match cli.command {
            Some(Commands::Stop(args)) => {
                assert_eq!(args.timeout, Some(Duration::from_secs(150)));
                assert_eq!(args.names, vec!["web"]);
            }
            _ => panic!("expected stop"),
        }
    }

    #[test]
    fn ssh_keeps_remote_flags() {
        let cli = Cli::try_parse_from(["dockhand", "ssh", "web", "ls", "-la", "/etc"]).unwrap();
        match cli.command {
            Some(Commands::Ssh(args)) => assert_eq!(args.command, vec!["ls", "-la", "/etc"]),
            _ => panic!("expected ssh"),
        }
    }
}
