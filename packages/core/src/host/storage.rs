//! Host record storage
//!
//! Load and save `<machine dir>/<name>/config.json`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use super::error::HostError;
use super::schema::{HostRecord, RecordHeader};
use super::{Host, HostRuntime};
use crate::config::MachinePaths;
use crate::driver::{DriverContext, DriverRegistry};

/// File name of the persisted host record
pub const CONFIG_FILE: &str = "config.json";

/// Write the host record, readable by the owner only
pub fn save_host(host: &Host) -> Result<(), HostError> {
    let record = host.to_record()?;
    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| HostError::SaveFailed(format!("Failed to serialize: {e}")))?;

    fs::create_dir_all(host.store_path())
        .map_err(|e| HostError::SaveFailed(format!("Failed to create directory: {e}")))?;

    let path = host.store_path().join(CONFIG_FILE);
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&path)
        .map_err(|e| HostError::SaveFailed(format!("Failed to create {}: {}", path.display(), e)))?;
    file.write_all(json.as_bytes())
        .map_err(|e| HostError::SaveFailed(format!("Failed to write {}: {}", path.display(), e)))?;

    tracing::debug!("Saved host config to {}", path.display());
    Ok(())
}

/// Load a host by name
///
/// Decoding takes two passes: the first reads only the driver name so the
/// matching driver can be constructed, the second hands the driver its own
/// configuration.
pub fn load_host(
    name: &str,
    paths: &MachinePaths,
    registry: &DriverRegistry,
    runtime: Arc<HostRuntime>,
) -> Result<Host, HostError> {
    let store_path = paths.host_dir(name);
    if !store_path.is_dir() {
        return Err(HostError::NotFound(name.to_string()));
    }

    let path = store_path.join(CONFIG_FILE);
    let contents = fs::read_to_string(&path).map_err(|e| {
        HostError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let header: RecordHeader = serde_json::from_str(&contents).map_err(|e| {
        HostError::LoadFailed(format!("Invalid JSON in {}: {}", path.display(), e))
    })?;

    let mut driver = registry.new_driver(
        &header.driver_name,
        DriverContext {
            machine_name: name.to_string(),
            store_path,
            ca_cert_path: paths.ca_cert_path(),
            ca_key_path: paths.ca_key_path(),
        },
    )?;

    let record: HostRecord = serde_json::from_str(&contents).map_err(|e| {
        HostError::LoadFailed(format!("Invalid host record in {}: {}", path.display(), e))
    })?;
    if record.name != name {
        tracing::debug!(
            "Host record in {} is named {}, using directory name {}",
            path.display(),
            record.name,
            name
        );
    }
    driver.load_config(record.driver)?;

    Host::new(
        name,
        driver,
        record.auth_options,
        record.swarm_options,
        runtime,
    )
}
