//! CLI command implementations
//!
//! One module per command family. Every command resolves its hosts through
//! [`crate::App`] and reports failures as a single error.

mod active;
mod create;
mod drivers;
mod env;
mod inspect;
mod lifecycle;
mod ls;
mod rm;
mod settings;
mod ssh;
mod status;

use clap::Args;

pub use active::{ActiveArgs, cmd_active};
pub use create::{CreateArgs, cmd_create};
pub use drivers::{DriversArgs, cmd_drivers};
pub use env::{EnvArgs, cmd_config, cmd_env};
pub use inspect::{cmd_inspect, cmd_ip, cmd_url};
pub use lifecycle::{
    LifecycleAction, LifecycleArgs, NamesArgs, cmd_lifecycle, cmd_regenerate_certs, cmd_upgrade,
};
pub use ls::{LsArgs, cmd_ls};
pub use rm::{RmArgs, cmd_rm};
pub use settings::{SettingsArgs, cmd_settings};
pub use ssh::{SshArgs, cmd_ssh};
pub use status::cmd_status;

/// A single machine, defaulting to the active one
#[derive(Args)]
pub struct HostArgs {
    /// Machine name (default: the active machine)
    pub name: Option<String>,
}
