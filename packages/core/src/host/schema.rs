//! Host record schema
//!
//! Data structures persisted at `<machine dir>/<name>/config.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::MachinePaths;

/// Where the trust material for one host lives
///
/// The CA key path is only ever read locally; nothing below it is uploaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthOptions {
    /// Per-host directory
    pub store_path: PathBuf,
    pub ca_cert_path: PathBuf,
    pub ca_key_path: PathBuf,
    pub client_cert_dir: PathBuf,
    pub server_cert_path: PathBuf,
    pub server_key_path: PathBuf,
    pub ca_cert_remote_path: String,
    pub server_cert_remote_path: String,
    pub server_key_remote_path: String,
}

impl AuthOptions {
    /// Default layout for a host stored at `store_path`
    pub fn for_host(paths: &MachinePaths, store_path: &Path) -> Self {
        Self {
            store_path: store_path.to_path_buf(),
            ca_cert_path: paths.ca_cert_path(),
            ca_key_path: paths.ca_key_path(),
            client_cert_dir: paths.client_cert_dir(),
            server_cert_path: store_path.join("server.pem"),
            server_key_path: store_path.join("server-key.pem"),
            ..Default::default()
        }
    }
}

/// Swarm membership requested at creation time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwarmOptions {
    pub is_swarm: bool,
    /// Discovery backend, e.g. `token://<id>`
    pub discovery: String,
    /// Address advertised by this node, `host:port`
    pub addr: String,
    pub master: bool,
    /// Manager listen address, e.g. `tcp://0.0.0.0:3376`
    pub host: String,
}

/// Persisted form of a host
///
/// `driver` holds the backend-specific configuration, whose shape depends on
/// `driver_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub name: String,
    pub driver_name: String,
    pub driver: serde_json::Value,
    #[serde(default)]
    pub auth_options: AuthOptions,
    #[serde(default)]
    pub swarm_options: SwarmOptions,
}

/// First decoding pass: only the discriminant
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecordHeader {
    pub driver_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_ignores_driver_shape() {
        let json = r#"{
            "name": "dev",
            "driverName": "rivet",
            "driver": {"apiEndpoint": "http://x", "cpu": 2},
            "authOptions": {}
        }"#;
        let header: RecordHeader = serde_json::from_str(json).unwrap();
        assert_eq!(header.driver_name, "rivet");

        let record: HostRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.driver["cpu"], 2);
        assert_eq!(record.swarm_options, SwarmOptions::default());
    }

    #[test]
    fn test_auth_options_layout() {
        let paths = MachinePaths::new("/home/alice");
        let store = paths.host_dir("dev");
        let auth = AuthOptions::for_host(&paths, &store);
        assert!(auth.server_cert_path.ends_with("machines/dev/server.pem"));
        assert!(auth.ca_key_path.ends_with(".ca/ca-key.pem"));
        assert!(auth.ca_cert_remote_path.is_empty());
    }
}
