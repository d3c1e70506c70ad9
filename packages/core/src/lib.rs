//! dockhand-core - Core library for dockhand
//!
//! Creates Docker hosts on pluggable backends, provisions the engine on them
//! with mutually-authenticated TLS and keeps a local record of every host.
//! The `dockhand` CLI is a thin layer over this crate.

pub mod cert;
pub mod config;
pub mod driver;
pub mod engine;
pub mod host;
pub mod provider;
pub mod provision;
pub mod store;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, MachinePaths, load_config};
pub use driver::{Driver, DriverRegistry, State};
pub use host::{Host, HostError, HostRuntime};
pub use provider::{HostListItem, Provider};
pub use store::{FileStore, Store};
pub use version::{get_version, get_version_long};
