//! In-memory backends for unit tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::config::MachinePaths;
use crate::driver::{
    DEFAULT_ENGINE_PORT, Driver, DriverContext, DriverError, DriverOptions, DriverRegistry,
    FanOutPolicy, State,
};
use crate::host::{
    AuthOptions, CommandOutput, Host, HostRuntime, RemoteShell, ShellError, ShellFactory,
    SshTarget, SwarmOptions, WaitPolicy, load_host,
};
use crate::provision::ProvisionerRegistry;
use crate::store::FileStore;

const UBUNTU_OS_RELEASE: &str = "NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\n\
PRETTY_NAME=\"Ubuntu 22.04.4 LTS\"\nVERSION_ID=\"22.04\"\n";

#[derive(Debug, Default)]
struct CloudState {
    states: HashMap<String, State>,
    failing_state: HashSet<String>,
    failing_actions: HashSet<(String, String)>,
    frozen: HashSet<String>,
    calls: HashMap<String, Vec<String>>,
}

/// Shared fake backend keyed by machine name
#[derive(Debug, Clone, Default)]
pub struct FakeCloud {
    inner: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, name: &str, state: State) {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(name.to_string(), state);
    }

    pub fn state(&self, name: &str) -> Option<State> {
        self.inner.lock().unwrap().states.get(name).copied()
    }

    /// Make state queries for `name` fail
    pub fn fail_state(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_state
            .insert(name.to_string());
    }

    pub fn fail_action(&self, name: &str, action: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing_actions
            .insert((name.to_string(), action.to_string()));
    }

    /// Accept actions for `name` without ever changing its state
    pub fn freeze(&self, name: &str) {
        self.inner.lock().unwrap().frozen.insert(name.to_string());
    }

    /// Lifecycle actions issued against `name`, in order
    pub fn calls_for(&self, name: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn query(&self, name: &str) -> Result<State, DriverError> {
        let inner = self.inner.lock().unwrap();
        if inner.failing_state.contains(name) {
            return Err(DriverError::Api(format!("state query failed for {name}")));
        }
        Ok(inner.states.get(name).copied().unwrap_or(State::None))
    }

    /// Record an action and apply its outcome; `None` deletes the machine
    fn apply(&self, name: &str, action: &str, outcome: Option<State>) -> Result<(), DriverError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .entry(name.to_string())
            .or_default()
            .push(action.to_string());
        if inner
            .failing_actions
            .contains(&(name.to_string(), action.to_string()))
        {
            return Err(DriverError::Api(format!("{action} failed for {name}")));
        }
        if inner.frozen.contains(name) {
            return Ok(());
        }
        match outcome {
            Some(state) => {
                inner.states.insert(name.to_string(), state);
            }
            None => {
                inner.states.remove(name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeConfig {
    pub ip_address: String,
    pub engine_port: u16,
}

#[derive(Debug)]
pub struct FakeDriver {
    ctx: DriverContext,
    cloud: FakeCloud,
    config: FakeConfig,
}

impl FakeDriver {
    pub fn new(ctx: DriverContext, cloud: FakeCloud) -> Self {
        Self {
            ctx,
            cloud,
            config: FakeConfig {
                ip_address: "127.0.0.1".to_string(),
                engine_port: DEFAULT_ENGINE_PORT,
            },
        }
    }

    pub fn set_engine_port(&mut self, port: u16) {
        self.config.engine_port = port;
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn driver_name(&self) -> &'static str {
        "fake"
    }

    fn context(&self) -> &DriverContext {
        &self.ctx
    }

    fn set_config_from_flags(&mut self, _opts: &dyn DriverOptions) -> Result<(), DriverError> {
        Ok(())
    }

    async fn get_url(&self) -> Result<String, DriverError> {
        if self.get_state().await? != State::Running {
            return Err(DriverError::HostNotRunning);
        }
        Ok(format!(
            "tcp://{}:{}",
            self.config.ip_address, self.config.engine_port
        ))
    }

    async fn get_ip(&self) -> Result<String, DriverError> {
        Ok(self.config.ip_address.clone())
    }

    async fn get_state(&self) -> Result<State, DriverError> {
        self.cloud.query(self.machine_name())
    }

    async fn pre_create_check(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn create(&mut self) -> Result<(), DriverError> {
        self.cloud
            .apply(self.machine_name(), "create", Some(State::Running))
    }

    async fn remove(&self) -> Result<(), DriverError> {
        self.cloud.apply(self.machine_name(), "remove", None)
    }

    async fn start(&self) -> Result<(), DriverError> {
        self.cloud
            .apply(self.machine_name(), "start", Some(State::Running))
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.cloud
            .apply(self.machine_name(), "stop", Some(State::Stopped))
    }

    async fn restart(&self) -> Result<(), DriverError> {
        self.cloud
            .apply(self.machine_name(), "restart", Some(State::Running))
    }

    async fn kill(&self) -> Result<(), DriverError> {
        self.cloud
            .apply(self.machine_name(), "kill", Some(State::Stopped))
    }

    fn save_config(&self) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::to_value(&self.config)?)
    }

    fn load_config(&mut self, value: serde_json::Value) -> Result<(), DriverError> {
        self.config = serde_json::from_value(value)?;
        Ok(())
    }
}

#[derive(Debug)]
struct ShellState {
    reachable: bool,
    reachable_after: u32,
    checks: u32,
    os_release: String,
    failures: Vec<(String, CommandOutput)>,
    commands: Vec<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// Scripted remote shell that records what it was asked to do
#[derive(Debug, Clone)]
pub struct FakeShell {
    inner: Arc<Mutex<ShellState>>,
}

impl Default for FakeShell {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ShellState {
                reachable: true,
                reachable_after: 0,
                checks: 0,
                os_release: UBUNTU_OS_RELEASE.to_string(),
                failures: Vec::new(),
                commands: Vec::new(),
                files: BTreeMap::new(),
            })),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().unwrap().reachable = reachable;
    }

    /// Become reachable on the `n`th check
    pub fn reachable_after(&self, n: u32) {
        self.inner.lock().unwrap().reachable_after = n;
    }

    pub fn checks(&self) -> u32 {
        self.inner.lock().unwrap().checks
    }

    pub fn set_os_release(&self, contents: &str) {
        self.inner.lock().unwrap().os_release = contents.to_string();
    }

    /// Fail every command containing `pattern`
    pub fn fail(&self, pattern: &str, status: i32, stderr: &str) {
        self.inner.lock().unwrap().failures.push((
            pattern.to_string(),
            CommandOutput {
                status,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        ));
    }

    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().unwrap().commands.clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|contents| String::from_utf8_lossy(contents).to_string())
    }

    pub fn files(&self) -> BTreeMap<String, String> {
        self.inner
            .lock()
            .unwrap()
            .files
            .iter()
            .map(|(path, contents)| (path.clone(), String::from_utf8_lossy(contents).to_string()))
            .collect()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn reachable(&self) -> Result<(), ShellError> {
        let mut inner = self.inner.lock().unwrap();
        inner.checks += 1;
        if !inner.reachable || inner.checks < inner.reachable_after {
            return Err(ShellError::Unreachable {
                addr: "127.0.0.1:22".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        let mut inner = self.inner.lock().unwrap();
        inner.commands.push(command.to_string());
        if let Some((_, output)) = inner
            .failures
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return Ok(output.clone());
        }
        let stdout = if command == "cat /etc/os-release" {
            inner.os_release.clone()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            status: 0,
            stdout,
            stderr: String::new(),
        })
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), ShellError> {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }
}

/// Hands out the same [`FakeShell`] for every target
#[derive(Debug, Clone)]
pub struct FakeShellFactory {
    shell: FakeShell,
}

impl ShellFactory for FakeShellFactory {
    fn connect(&self, _target: SshTarget) -> Box<dyn RemoteShell> {
        Box::new(self.shell.clone())
    }
}

pub fn test_runtime() -> Arc<HostRuntime> {
    test_runtime_with_shell(FakeShell::new())
}

pub fn test_runtime_with_shell(shell: FakeShell) -> Arc<HostRuntime> {
    let fast = WaitPolicy::new(3, Duration::from_millis(10));
    Arc::new(HostRuntime {
        shells: Arc::new(FakeShellFactory { shell }),
        provisioners: Arc::new(ProvisionerRegistry::with_builtins()),
        ssh_wait: fast,
        engine_wait: fast,
        state_poll_interval: Duration::from_millis(10),
        key_bits: 2048,
        swarm_image: "swarm:latest".to_string(),
    })
}

/// Machine directory in a temp dir with the `fake` and `cluster` drivers
pub struct TestMachines {
    _dir: TempDir,
    pub paths: MachinePaths,
    pub registry: Arc<DriverRegistry>,
    pub runtime: Arc<HostRuntime>,
    cloud: FakeCloud,
}

impl TestMachines {
    pub fn new(cloud: FakeCloud) -> Self {
        Self::with_shell(cloud, FakeShell::new())
    }

    pub fn with_shell(cloud: FakeCloud, shell: FakeShell) -> Self {
        let dir = TempDir::new().unwrap();
        let paths = MachinePaths::new(dir.path());
        let runtime = test_runtime_with_shell(shell);
        let registry = DriverRegistry::build(|registry, weak| {
            let fake_cloud = cloud.clone();
            registry.register("fake", vec![], move |ctx| {
                Box::new(FakeDriver::new(ctx, fake_cloud.clone()))
            })?;
            registry.register_cluster(weak, FanOutPolicy::default(), runtime.clone())
        })
        .unwrap();

        Self {
            _dir: dir,
            paths,
            registry,
            runtime,
            cloud,
        }
    }

    pub fn new_driver(&self, driver_name: &str, machine_name: &str) -> Box<dyn Driver> {
        self.registry
            .new_driver(
                driver_name,
                DriverContext {
                    machine_name: machine_name.to_string(),
                    store_path: self.paths.host_dir(machine_name),
                    ca_cert_path: self.paths.ca_cert_path(),
                    ca_key_path: self.paths.ca_key_path(),
                },
            )
            .unwrap()
    }

    /// Persist a `fake` host and put its backend machine in `state`
    pub fn add_fake(&self, name: &str, state: State) {
        let store_path = self.paths.host_dir(name);
        fs::create_dir_all(&store_path).unwrap();
        let host = Host::new(
            name,
            self.new_driver("fake", name),
            AuthOptions::for_host(&self.paths, &store_path),
            SwarmOptions::default(),
            self.runtime.clone(),
        )
        .unwrap();
        host.save().unwrap();
        self.cloud.set_state(name, state);
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(
            self.paths.clone(),
            self.registry.clone(),
            self.runtime.clone(),
        )
    }

    pub fn load(&self, name: &str) -> Host {
        load_host(name, &self.paths, &self.registry, self.runtime.clone()).unwrap()
    }
}
