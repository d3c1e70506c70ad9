//! Driver registry
//!
//! Explicit name -> constructor mapping, built once at process start and
//! passed by reference. Tests build their own registry with fake drivers.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::cluster::ClusterDriver;
use super::error::DriverError;
use super::fanout::FanOutPolicy;
use super::generic::GenericDriver;
use super::options::FlagSpec;
use super::rivet::RivetDriver;
use super::{Driver, DriverContext};
use crate::host::HostRuntime;

/// Constructor for one driver type
pub type DriverFactory = Arc<dyn Fn(DriverContext) -> Box<dyn Driver> + Send + Sync>;

struct RegisteredDriver {
    factory: DriverFactory,
    create_flags: Vec<FlagSpec>,
}

#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, RegisteredDriver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a shared registry whose drivers may hold a weak handle back to it
    ///
    /// Fleet drivers resolve their members through the same registry that
    /// constructed them.
    pub fn build<F>(populate: F) -> Result<Arc<Self>, DriverError>
    where
        F: FnOnce(&mut Self, &Weak<Self>) -> Result<(), DriverError>,
    {
        let mut outcome = Ok(());
        let registry = Arc::new_cyclic(|weak| {
            let mut registry = Self::new();
            outcome = populate(&mut registry, weak);
            registry
        });
        outcome.map(|()| registry)
    }

    /// Registry with every built-in driver
    pub fn with_builtins(
        policy: FanOutPolicy,
        runtime: Arc<HostRuntime>,
    ) -> Result<Arc<Self>, DriverError> {
        Self::build(|registry, weak| {
            registry.register("generic", GenericDriver::create_flags(), |ctx| {
                Box::new(GenericDriver::new(ctx))
            })?;
            registry.register("rivet", RivetDriver::create_flags(), |ctx| {
                Box::new(RivetDriver::new(ctx))
            })?;
            registry.register_cluster(weak, policy, runtime)
        })
    }

    /// Register the fleet driver against this registry
    pub fn register_cluster(
        &mut self,
        weak: &Weak<Self>,
        policy: FanOutPolicy,
        runtime: Arc<HostRuntime>,
    ) -> Result<(), DriverError> {
        let weak = weak.clone();
        self.register("cluster", ClusterDriver::create_flags(), move |ctx| {
            Box::new(ClusterDriver::new(
                ctx,
                weak.clone(),
                policy.clone(),
                runtime.clone(),
            ))
        })
    }

    /// Register a driver constructor
    ///
    /// Fails if the name is already taken.
    pub fn register<F>(
        &mut self,
        name: &str,
        create_flags: Vec<FlagSpec>,
        factory: F,
    ) -> Result<(), DriverError>
    where
        F: Fn(DriverContext) -> Box<dyn Driver> + Send + Sync + 'static,
    {
        if self.drivers.contains_key(name) {
            return Err(DriverError::AlreadyRegistered(name.to_string()));
        }
        self.drivers.insert(
            name.to_string(),
            RegisteredDriver {
                factory: Arc::new(factory),
                create_flags,
            },
        );
        tracing::debug!("Registered driver: {}", name);
        Ok(())
    }

    /// Construct a driver by name
    pub fn new_driver(&self, name: &str, ctx: DriverContext) -> Result<Box<dyn Driver>, DriverError> {
        let registered = self
            .drivers
            .get(name)
            .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))?;
        Ok((registered.factory)(ctx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Registered driver names, sorted
    pub fn driver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Flags published by one driver
    pub fn flags_for(&self, name: &str) -> Result<&[FlagSpec], DriverError> {
        self.drivers
            .get(name)
            .map(|d| d.create_flags.as_slice())
            .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))
    }

    /// Flags from every registered driver, sorted by name
    pub fn create_flags(&self) -> Vec<FlagSpec> {
        let mut flags: Vec<FlagSpec> = self
            .drivers
            .values()
            .flat_map(|d| d.create_flags.iter().cloned())
            .collect();
        flags.sort_by(|a, b| a.name.cmp(b.name));
        flags
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.driver_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCloud, FakeDriver, test_runtime};
    use std::path::PathBuf;

    fn ctx(name: &str) -> DriverContext {
        DriverContext {
            machine_name: name.to_string(),
            store_path: PathBuf::from("/tmp/machines").join(name),
            ca_cert_path: PathBuf::from("/tmp/machines/.ca/ca.pem"),
            ca_key_path: PathBuf::from("/tmp/machines/.ca/ca-key.pem"),
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let cloud = FakeCloud::new();
        let mut registry = DriverRegistry::new();
        let c = cloud.clone();
        registry
            .register("fake", vec![], move |ctx| Box::new(FakeDriver::new(ctx, c.clone())))
            .unwrap();

        let c = cloud.clone();
        let err = registry
            .register("fake", vec![], move |ctx| Box::new(FakeDriver::new(ctx, c.clone())))
            .unwrap_err();
        assert!(matches!(err, DriverError::AlreadyRegistered(name) if name == "fake"));
    }

    #[test]
    fn test_unknown_driver() {
        let registry = DriverRegistry::new();
        let err = registry.new_driver("virtualbox", ctx("dev")).unwrap_err();
        assert!(matches!(err, DriverError::UnknownDriver(_)));
        assert!(err.to_string().contains("virtualbox"));
    }

    #[test]
    fn test_builtins_are_sorted() {
        let registry =
            DriverRegistry::with_builtins(FanOutPolicy::default(), test_runtime()).unwrap();
        assert_eq!(registry.driver_names(), vec!["cluster", "generic", "rivet"]);

        let names: Vec<&str> = registry.create_flags().iter().map(|f| f.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"cluster-node"));
        assert!(names.contains(&"generic-ip-address"));
        assert!(names.contains(&"rivet-address"));
    }

    #[test]
    fn test_new_driver_uses_context() {
        let registry =
            DriverRegistry::with_builtins(FanOutPolicy::default(), test_runtime()).unwrap();
        let driver = registry.new_driver("generic", ctx("dev")).unwrap();
        assert_eq!(driver.driver_name(), "generic");
        assert_eq!(driver.machine_name(), "dev");
    }
}
