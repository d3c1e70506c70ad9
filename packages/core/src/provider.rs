//! Orchestration facade
//!
//! Sequences host creation and fans out listing queries. Everything else is a
//! thin delegation to the [`Store`].

use std::fs;

use tokio::sync::mpsc;

use crate::cert::setup_machine_certificates;
use crate::driver::{DriverContext, DriverOptions, State};
use crate::host::{
    AuthOptions, CONFIG_FILE, Host, HostError, SwarmOptions, validate_host_name,
};
use crate::store::{FileStore, Store};

/// One row of `dockhand ls`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostListItem {
    pub name: String,
    pub active: bool,
    pub driver_name: String,
    pub state: State,
    /// Empty when the host is not running or has no URL
    pub url: String,
    pub swarm: String,
    /// Problem encountered while querying this host
    pub error: Option<String>,
}

impl HostListItem {
    async fn query(host: Host, active: bool) -> Self {
        let mut error = None;

        let state = match host.state().await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("error getting state for host {}: {}", host.name(), e);
                error = Some(e.to_string());
                State::Error
            }
        };

        let url = match host.url().await {
            Ok(url) => url,
            Err(HostError::Driver(e)) if e.is_benign_for_listing() => String::new(),
            Err(e) => {
                tracing::error!("error getting URL for host {}: {}", host.name(), e);
                error.get_or_insert_with(|| e.to_string());
                String::new()
            }
        };

        let swarm = &host.swarm_options;
        let swarm = match (swarm.is_swarm, swarm.master) {
            (false, _) => String::new(),
            (true, true) => format!("{} (master)", swarm.discovery),
            (true, false) => swarm.discovery.clone(),
        };

        Self {
            name: host.name().to_string(),
            active,
            driver_name: host.driver_name().to_string(),
            state,
            url,
            swarm,
            error,
        }
    }

    /// Row for a host whose record could not be loaded
    fn unreadable(name: String, active: bool, error: &HostError) -> Self {
        Self {
            name,
            active,
            driver_name: String::new(),
            state: State::Error,
            url: String::new(),
            swarm: String::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Provider {
    store: FileStore,
}

impl Provider {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Create, start and provision a new host
    ///
    /// Local trust material is bootstrapped on first use. If creation fails
    /// before the backend resource was recorded, the empty host directory is
    /// cleaned up.
    pub async fn create(
        &self,
        name: &str,
        driver_name: &str,
        swarm: SwarmOptions,
        opts: &dyn DriverOptions,
    ) -> Result<Host, HostError> {
        validate_host_name(name)?;
        if self.store.exists(name) {
            return Err(HostError::AlreadyExists(name.to_string()));
        }

        let paths = self.store.paths();
        let runtime = self.store.runtime().clone();
        setup_machine_certificates(paths, &whoami::username(), runtime.key_bits)?;

        let store_path = paths.host_dir(name);
        let auth = AuthOptions::for_host(paths, &store_path);
        let mut driver = self.store.registry().new_driver(
            driver_name,
            DriverContext {
                machine_name: name.to_string(),
                store_path: store_path.clone(),
                ca_cert_path: auth.ca_cert_path.clone(),
                ca_key_path: auth.ca_key_path.clone(),
            },
        )?;
        driver.set_config_from_flags(opts)?;

        fs::create_dir_all(&store_path)?;
        let mut host = Host::new(name, driver, auth, swarm, runtime)?;
        if let Err(e) = host.create().await {
            if !store_path.join(CONFIG_FILE).exists() {
                if let Err(cleanup) = fs::remove_dir_all(&store_path) {
                    tracing::debug!("Could not remove {}: {}", store_path.display(), cleanup);
                }
            }
            return Err(e);
        }
        Ok(host)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.store.exists(name)
    }

    pub fn get(&self, name: &str) -> Result<Host, HostError> {
        self.store.get(name)
    }

    pub fn get_active(&self) -> Result<Option<Host>, HostError> {
        self.store.get_active()
    }

    pub fn set_active(&self, name: &str) -> Result<(), HostError> {
        self.store.set_active(name)
    }

    pub fn list(&self) -> Result<Vec<Host>, HostError> {
        self.store.list()
    }

    pub async fn remove(&self, name: &str, force: bool) -> Result<(), HostError> {
        self.store.remove(name, force).await
    }

    /// State and URL of every host, queried concurrently
    ///
    /// One task per host reports through a channel sized to the host count;
    /// exactly that many results are drained before the channel goes away.
    /// A host whose record cannot be loaded is listed as an error row.
    /// Rows are sorted by lower-cased name.
    pub async fn list_items(&self) -> Result<Vec<HostListItem>, HostError> {
        let mut items = Vec::new();
        let mut hosts = Vec::new();
        for name in self.store.list_names()? {
            let active = self.store.is_active(&name)?;
            match self.store.load(&name) {
                Ok(host) => hosts.push((host, active)),
                Err(e) => {
                    tracing::error!("error loading host {}: {}", name, e);
                    items.push(HostListItem::unreadable(name, active, &e));
                }
            }
        }

        let count = hosts.len();
        if count > 0 {
            let (tx, mut rx) = mpsc::channel(count);
            for (host, active) in hosts {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let item = HostListItem::query(host, active).await;
                    if tx.send(item).await.is_err() {
                        tracing::debug!("listing receiver dropped");
                    }
                });
            }
            drop(tx);

            for _ in 0..count {
                match rx.recv().await {
                    Some(item) => items.push(item),
                    None => break,
                }
            }
        }

        items.sort_by_key(|item| item.name.to_lowercase());
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{FlagValue, OptionBag};
    use crate::testing::{FakeCloud, FakeShell, TestMachines};

    fn provider(machines: &TestMachines) -> Provider {
        Provider::new(machines.store())
    }

    #[tokio::test]
    async fn test_create_bootstraps_trust_and_persists() {
        let cloud = FakeCloud::new();
        let machines = TestMachines::with_shell(cloud.clone(), FakeShell::new());
        let provider = provider(&machines);

        let host = provider
            .create("web", "fake", SwarmOptions::default(), &OptionBag::new())
            .await
            .unwrap();

        assert_eq!(host.name(), "web");
        assert!(machines.paths.ca_cert_path().exists());
        assert!(machines.paths.client_cert_path().exists());
        assert!(provider.exists("web"));
        assert_eq!(cloud.state("web"), Some(State::Running));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let machines = TestMachines::new(FakeCloud::new());
        machines.add_fake("web", State::Running);

        let err = provider(&machines)
            .create("web", "fake", SwarmOptions::default(), &OptionBag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected_before_anything_else() {
        let machines = TestMachines::new(FakeCloud::new());
        let err = provider(&machines)
            .create("my host", "fake", SwarmOptions::default(), &OptionBag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidName(_)));
        assert!(!machines.paths.ca_cert_path().exists());
    }

    #[tokio::test]
    async fn test_failed_pre_create_leaves_no_directory() {
        let machines = TestMachines::new(FakeCloud::new());
        machines.add_fake("a", State::Running);
        let mut bag = OptionBag::new();
        bag.set(
            "cluster-node",
            FlagValue::StringSlice(vec!["a".to_string(), "ghost".to_string()]),
        );

        let err = provider(&machines)
            .create("fleet", "cluster", SwarmOptions::default(), &bag)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert!(!machines.paths.host_dir("fleet").exists());
    }

    #[tokio::test]
    async fn test_cluster_create_skips_provisioning() {
        let cloud = FakeCloud::new();
        let shell = FakeShell::new();
        let machines = TestMachines::with_shell(cloud.clone(), shell.clone());
        machines.add_fake("a", State::Running);
        let mut bag = OptionBag::new();
        bag.set("cluster-node", FlagValue::StringSlice(vec!["a".to_string()]));

        provider(&machines)
            .create("fleet", "cluster", SwarmOptions::default(), &bag)
            .await
            .unwrap();
        assert!(shell.commands().is_empty());
        assert!(machines.paths.host_dir("fleet").join(CONFIG_FILE).exists());
    }

    #[tokio::test]
    async fn test_list_items_sorted_case_insensitively() {
        let cloud = FakeCloud::new();
        let machines = TestMachines::new(cloud.clone());
        machines.add_fake("beta", State::Running);
        machines.add_fake("Alpha", State::Stopped);
        machines.add_fake("gamma", State::Running);
        cloud.fail_state("gamma");
        let provider = provider(&machines);
        provider.set_active("beta").unwrap();

        let items = provider.list_items().await.unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);

        assert_eq!(items[0].state, State::Stopped);
        assert!(items[1].active);
        assert!(!items[0].active);
        assert_eq!(items[1].url, "tcp://127.0.0.1:2376");
        assert_eq!(items[2].state, State::Error);
        assert!(items[2].error.is_some());
    }

    #[tokio::test]
    async fn test_unreadable_record_is_listed_as_error() {
        let cloud = FakeCloud::new();
        let machines = TestMachines::new(cloud.clone());
        machines.add_fake("good", State::Running);
        machines.add_fake("broken", State::Running);
        fs::write(
            machines.paths.host_dir("broken").join(CONFIG_FILE),
            "{ not json",
        )
        .unwrap();

        let items = provider(&machines).list_items().await.unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["broken", "good"]);

        assert_eq!(items[0].state, State::Error);
        assert!(items[0].error.as_deref().unwrap().starts_with("Failed to load host"));
        assert_eq!(items[1].state, State::Running);
        assert!(items[1].error.is_none());
    }

    #[tokio::test]
    async fn test_stopped_host_lists_empty_url() {
        let cloud = FakeCloud::new();
        let machines = TestMachines::new(cloud.clone());
        machines.add_fake("web", State::Stopped);

        let items = provider(&machines).list_items().await.unwrap();
        assert_eq!(items[0].url, "");
        assert!(items[0].error.is_none());
    }
}
