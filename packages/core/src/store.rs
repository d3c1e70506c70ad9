//! Host store
//!
//! The persistence boundary the CLI and fleet drivers go through. [`FileStore`]
//! keeps one directory per host under the machine directory and records the
//! active host in `<machine dir>/.active`.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MachinePaths;
use crate::driver::DriverRegistry;
use crate::host::{CONFIG_FILE, Host, HostError, HostRuntime, load_host};

#[async_trait]
pub trait Store: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    /// Load a host, constructing its driver from the record
    fn load(&self, name: &str) -> Result<Host, HostError>;

    fn get(&self, name: &str) -> Result<Host, HostError> {
        self.load(name)
    }

    /// Stored host names, sorted
    fn list_names(&self) -> Result<Vec<String>, HostError>;

    fn list(&self) -> Result<Vec<Host>, HostError> {
        self.list_names()?
            .iter()
            .map(|name| self.load(name))
            .collect()
    }

    fn get_active(&self) -> Result<Option<Host>, HostError>;

    fn set_active(&self, name: &str) -> Result<(), HostError>;

    fn is_active(&self, name: &str) -> Result<bool, HostError>;

    /// Remove the host from its backend and from the store
    async fn remove(&self, name: &str, force: bool) -> Result<(), HostError>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    paths: MachinePaths,
    registry: Arc<DriverRegistry>,
    runtime: Arc<HostRuntime>,
}

impl FileStore {
    pub fn new(
        paths: MachinePaths,
        registry: Arc<DriverRegistry>,
        runtime: Arc<HostRuntime>,
    ) -> Self {
        Self {
            paths,
            registry,
            runtime,
        }
    }

    pub fn paths(&self) -> &MachinePaths {
        &self.paths
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    pub fn runtime(&self) -> &Arc<HostRuntime> {
        &self.runtime
    }

    fn active_name(&self) -> Result<Option<String>, HostError> {
        match fs::read_to_string(self.paths.active_path()) {
            Ok(contents) => {
                let name = contents.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_active(&self) -> Result<(), HostError> {
        match fs::remove_file(self.paths.active_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Store for FileStore {
    fn exists(&self, name: &str) -> bool {
        self.paths.host_dir(name).is_dir()
    }

    fn load(&self, name: &str) -> Result<Host, HostError> {
        load_host(name, &self.paths, &self.registry, self.runtime.clone())
    }

    fn list_names(&self) -> Result<Vec<String>, HostError> {
        let entries = match fs::read_dir(self.paths.machine_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.path().join(CONFIG_FILE).is_file() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn get_active(&self) -> Result<Option<Host>, HostError> {
        let Some(name) = self.active_name()? else {
            return Ok(None);
        };
        if !self.exists(&name) {
            tracing::debug!("Active host {} no longer exists", name);
            return Ok(None);
        }
        self.load(&name).map(Some)
    }

    fn set_active(&self, name: &str) -> Result<(), HostError> {
        if !self.exists(name) {
            return Err(HostError::NotFound(name.to_string()));
        }
        fs::create_dir_all(self.paths.machine_dir())?;
        fs::write(self.paths.active_path(), name)?;
        tracing::debug!("Active host is now {}", name);
        Ok(())
    }

    fn is_active(&self, name: &str) -> Result<bool, HostError> {
        Ok(self.active_name()?.as_deref() == Some(name))
    }

    async fn remove(&self, name: &str, force: bool) -> Result<(), HostError> {
        let was_active = self.is_active(name)?;
        let host = self.load(name)?;
        host.remove(force).await?;
        if was_active {
            self.clear_active()?;
        }
        Ok(())
    }
}
