//! Rivet driver
//!
//! Drives a small HTTP provisioning API. Every endpoint takes the machine
//! name as a query parameter and answers `{"status_code": .., "response": ..}`.
//! Key material only travels in the JSON body of `/create`.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::cloud_init::generate_cloud_init_base64;
use super::error::DriverError;
use super::options::{DriverOptions, FlagSpec};
use super::ssh_key::generate_ssh_key;
use super::{DEFAULT_ENGINE_PORT, Driver, DriverContext, State};

const DRIVER_NAME: &str = "rivet";

/// Key size for generated machine SSH keys
const SSH_KEY_BITS: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RivetConfig {
    pub api_endpoint: String,
    #[serde(default)]
    pub auth_token: String,
    pub cpu: i64,
    pub memory: i64,
    pub storage: i64,
    pub ssh_user: String,
    pub ssh_port: u16,
    #[serde(default)]
    pub cloud_init: bool,
}

impl Default for RivetConfig {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            auth_token: String::new(),
            cpu: 1,
            memory: 1024,
            storage: 10,
            ssh_user: "root".to_string(),
            ssh_port: 22,
            cloud_init: false,
        }
    }
}

/// Body of `/create`
#[derive(Debug, Serialize)]
struct CreateRequest {
    ssh_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
}

/// Body returned by every rivet endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    response: String,
}

impl ApiResponse {
    /// Payload of a successful call; anything else becomes a verbatim API error
    fn into_result(self) -> Result<String, DriverError> {
        if self.status_code == 200 {
            Ok(self.response)
        } else {
            Err(DriverError::Api(self.response))
        }
    }
}

/// Thin client over the rivet HTTP API
#[derive(Debug, Clone)]
struct RivetApi {
    client: Client,
    endpoint: String,
    auth_token: String,
}

impl RivetApi {
    fn new(endpoint: &str, auth_token: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, DriverError> {
        let url = format!("{}{}", self.endpoint, path);
        tracing::debug!("rivet request: method={} url={}", method, url);

        let mut request = self.client.request(method, &url).query(params);
        if !self.auth_token.is_empty() {
            request = request.header("X-Auth-Token", &self.auth_token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(ApiResponse {
                status_code: StatusCode::UNAUTHORIZED.as_u16(),
                response: "Unauthorized".to_string(),
            });
        }
        Ok(response.json::<ApiResponse>().await?)
    }

    async fn get(&self, path: &str, name: &str) -> Result<String, DriverError> {
        self.request(Method::GET, path, &[("name", name.to_string())], None)
            .await?
            .into_result()
    }
}

#[derive(Debug)]
pub struct RivetDriver {
    ctx: DriverContext,
    config: RivetConfig,
}

impl RivetDriver {
    pub fn new(ctx: DriverContext) -> Self {
        Self {
            ctx,
            config: RivetConfig::default(),
        }
    }

    pub fn config(&self) -> &RivetConfig {
        &self.config
    }

    pub fn create_flags() -> Vec<FlagSpec> {
        vec![
            FlagSpec::string("rivet-address", "Address of rivet API endpoint", "")
                .with_env("RIVET_ADDRESS"),
            FlagSpec::string("rivet-token", "Auth token for the rivet API", "")
                .with_env("RIVET_TOKEN"),
            FlagSpec::int("rivet-cpu", "CPU for rivet instance", 1).with_env("RIVET_CPU"),
            FlagSpec::int("rivet-memory", "Memory for rivet instance (in MB)", 1024)
                .with_env("RIVET_MEMORY"),
            FlagSpec::int("rivet-storage", "Storage for rivet instance (in GB)", 10)
                .with_env("RIVET_STORAGE"),
            FlagSpec::string("rivet-ssh-user", "SSH user for rivet instance", "root")
                .with_env("RIVET_SSH_USER"),
            FlagSpec::int("rivet-ssh-port", "SSH port for rivet instance", 22)
                .with_env("RIVET_SSH_PORT"),
            FlagSpec::bool(
                "rivet-cloud-init",
                "Bootstrap the engine with cloud-init user data",
            )
            .with_env("RIVET_CLOUD_INIT"),
        ]
    }

    fn api(&self) -> RivetApi {
        RivetApi::new(&self.config.api_endpoint, &self.config.auth_token)
    }

    fn private_key_path(&self) -> PathBuf {
        self.ctx.store_path.join("id_rsa")
    }

    async fn simple_action(&self, path: &str) -> Result<(), DriverError> {
        let response = self.api().get(path, &self.ctx.machine_name).await?;
        tracing::debug!("rivet {}: {}", path, response);
        Ok(())
    }
}

/// Map the API's state strings onto [`State`]
fn parse_state(remote: &str) -> State {
    match remote {
        "running" => State::Running,
        "stopped" => State::Stopped,
        "pending" => State::Starting,
        _ => State::None,
    }
}

#[async_trait]
impl Driver for RivetDriver {
    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn context(&self) -> &DriverContext {
        &self.ctx
    }

    fn set_config_from_flags(&mut self, opts: &dyn DriverOptions) -> Result<(), DriverError> {
        let api_endpoint = opts.string("rivet-address");
        if api_endpoint.is_empty() {
            return Err(DriverError::missing_option(DRIVER_NAME, "rivet-address"));
        }

        let ssh_port = u16::try_from(opts.int("rivet-ssh-port")).map_err(|_| {
            DriverError::InvalidOption {
                option: "rivet-ssh-port".to_string(),
                message: "not a valid port".to_string(),
            }
        })?;

        let ssh_user = opts.string("rivet-ssh-user");
        self.config = RivetConfig {
            api_endpoint,
            auth_token: opts.string("rivet-token"),
            cpu: opts.int("rivet-cpu"),
            memory: opts.int("rivet-memory"),
            storage: opts.int("rivet-storage"),
            ssh_user: if ssh_user.is_empty() {
                "root".to_string()
            } else {
                ssh_user
            },
            ssh_port: if ssh_port == 0 { 22 } else { ssh_port },
            cloud_init: opts.bool("rivet-cloud-init"),
        };
        Ok(())
    }

    async fn get_url(&self) -> Result<String, DriverError> {
        let ip = self.get_ip().await?;
        Ok(format!("tcp://{ip}:{DEFAULT_ENGINE_PORT}"))
    }

    async fn get_ip(&self) -> Result<String, DriverError> {
        let ip = self.api().get("/ip", &self.ctx.machine_name).await?;
        tracing::debug!("ip: {}", ip);
        Ok(ip)
    }

    async fn get_state(&self) -> Result<State, DriverError> {
        let remote = self.api().get("/state", &self.ctx.machine_name).await?;
        Ok(parse_state(&remote))
    }

    async fn pre_create_check(&self) -> Result<(), DriverError> {
        if self.config.cpu < 1 || self.config.memory < 1 || self.config.storage < 1 {
            return Err(DriverError::InvalidOption {
                option: "rivet-cpu/rivet-memory/rivet-storage".to_string(),
                message: "resources must be positive".to_string(),
            });
        }
        Ok(())
    }

    async fn create(&mut self) -> Result<(), DriverError> {
        tracing::info!("Creating Rivet instance...");

        let public_key = generate_ssh_key(&self.private_key_path(), SSH_KEY_BITS)?;

        let params = [
            ("name", self.ctx.machine_name.clone()),
            ("cpu", self.config.cpu.to_string()),
            ("memory", self.config.memory.to_string()),
            ("storage", self.config.storage.to_string()),
        ];
        let user_data = if self.config.cloud_init {
            Some(generate_cloud_init_base64(&*self, None)?)
        } else {
            None
        };
        let body = serde_json::to_value(CreateRequest {
            ssh_key: String::from_utf8_lossy(&public_key).trim_end().to_string(),
            user_data,
        })?;

        let response = self
            .api()
            .request(Method::POST, "/create", &params, Some(body))
            .await?
            .into_result()?;
        tracing::debug!("rivet create: {}", response);
        Ok(())
    }

    async fn remove(&self) -> Result<(), DriverError> {
        self.simple_action("/remove").await
    }

    async fn start(&self) -> Result<(), DriverError> {
        self.simple_action("/start").await
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.simple_action("/stop").await
    }

    async fn restart(&self) -> Result<(), DriverError> {
        self.simple_action("/restart").await
    }

    async fn kill(&self) -> Result<(), DriverError> {
        self.simple_action("/kill").await
    }

    fn ssh_port(&self) -> u16 {
        self.config.ssh_port
    }

    fn ssh_user(&self) -> String {
        self.config.ssh_user.clone()
    }

    fn ssh_key_path(&self) -> Option<PathBuf> {
        Some(self.private_key_path())
    }

    fn save_config(&self) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::to_value(&self.config)?)
    }

    fn load_config(&mut self, value: serde_json::Value) -> Result<(), DriverError> {
        self.config = serde_json::from_value(value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::setup_machine_certificates;
    use crate::config::MachinePaths;
    use crate::driver::options::{FlagValue, OptionBag};
    use base64::Engine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn ctx() -> DriverContext {
        DriverContext {
            machine_name: "web-1".to_string(),
            store_path: PathBuf::from("/tmp/machines/web-1"),
            ca_cert_path: PathBuf::from("/tmp/machines/.ca/ca.pem"),
            ca_key_path: PathBuf::from("/tmp/machines/.ca/ca-key.pem"),
        }
    }

    /// Answer one HTTP request with `status` and `body`, returning the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 {
                    break;
                }
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (endpoint, handle)
    }

    fn driver_for(endpoint: &str) -> RivetDriver {
        driver_with(ctx(), endpoint, false)
    }

    fn driver_with(ctx: DriverContext, endpoint: &str, cloud_init: bool) -> RivetDriver {
        let mut bag =
            OptionBag::from_flags_with_env(&RivetDriver::create_flags(), |_| None).unwrap();
        bag.set("rivet-address", FlagValue::String(endpoint.to_string()));
        bag.set("rivet-cloud-init", FlagValue::Bool(cloud_init));
        let mut driver = RivetDriver::new(ctx);
        driver.set_config_from_flags(&bag).unwrap();
        driver
    }

    #[test]
    fn test_address_is_required() {
        let bag = OptionBag::from_flags_with_env(&RivetDriver::create_flags(), |_| None).unwrap();
        let err = RivetDriver::new(ctx()).set_config_from_flags(&bag).unwrap_err();
        assert!(err.to_string().contains("--rivet-address"));
    }

    #[test]
    fn test_defaults_follow_flags() {
        let driver = driver_for("http://rivet.local");
        assert_eq!(driver.config().cpu, 1);
        assert_eq!(driver.config().memory, 1024);
        assert_eq!(driver.config().storage, 10);
        assert_eq!(driver.ssh_user(), "root");
        assert_eq!(driver.ssh_port(), 22);
        assert_eq!(
            driver.ssh_key_path(),
            Some(PathBuf::from("/tmp/machines/web-1/id_rsa"))
        );
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(parse_state("running"), State::Running);
        assert_eq!(parse_state("stopped"), State::Stopped);
        assert_eq!(parse_state("pending"), State::Starting);
        assert_eq!(parse_state("exploded"), State::None);
    }

    #[tokio::test]
    async fn test_get_state_queries_api() {
        let (endpoint, server) =
            serve_once("200 OK", r#"{"status_code":200,"response":"running"}"#).await;
        let driver = driver_for(&endpoint);

        assert_eq!(driver.get_state().await.unwrap(), State::Running);
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /state?name=web-1"));
    }

    #[tokio::test]
    async fn test_api_error_is_verbatim() {
        let (endpoint, _server) =
            serve_once("200 OK", r#"{"status_code":404,"response":"no such machine"}"#).await;
        let driver = driver_for(&endpoint);

        let err = driver.get_ip().await.unwrap_err();
        assert_eq!(err.to_string(), "no such machine");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_message() {
        let (endpoint, _server) = serve_once("401 Unauthorized", "").await;
        let driver = driver_for(&endpoint);

        let err = driver.stop().await.unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[tokio::test]
    async fn test_create_sends_user_data_in_body() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = MachinePaths::new(dir.path());
        setup_machine_certificates(&paths, "alice", 2048).unwrap();
        std::fs::create_dir_all(paths.host_dir("web-1")).unwrap();
        let ctx = DriverContext {
            machine_name: "web-1".to_string(),
            store_path: paths.host_dir("web-1"),
            ca_cert_path: paths.ca_cert_path(),
            ca_key_path: paths.ca_key_path(),
        };

        let (endpoint, server) =
            serve_once("200 OK", r#"{"status_code":200,"response":"created"}"#).await;
        let mut driver = driver_with(ctx, &endpoint, true);
        driver.create().await.unwrap();

        let request = server.await.unwrap();
        let (head, body) = request.split_once("\r\n\r\n").unwrap();
        let request_line = head.lines().next().unwrap();
        assert!(request_line.starts_with("POST /create?name=web-1"));
        assert!(!request_line.contains("user_data"));
        assert!(!request_line.contains("ssh"));

        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert!(body["ssh_key"].as_str().unwrap().starts_with("ssh-rsa "));
        let user_data = body["user_data"].as_str().unwrap();
        let document = String::from_utf8(
            base64::engine::general_purpose::STANDARD.decode(user_data).unwrap(),
        )
        .unwrap();
        assert!(document.starts_with("#cloud-config"));
    }
}
