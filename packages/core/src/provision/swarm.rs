//! Swarm membership

use super::auth::engine_endpoint;
use super::error::ProvisionError;
use super::{ProvisionSettings, Provisioner};
use crate::driver::Driver;
use crate::host::{RemoteShell, SwarmOptions, shell_quote, wait_for_tcp};

/// Start the swarm containers requested by `swarm`
///
/// A no-op unless swarm membership was requested. The master container is
/// only started on the designated master; every node runs the join agent.
pub async fn configure_swarm(
    provisioner: &dyn Provisioner,
    shell: &dyn RemoteShell,
    driver: &dyn Driver,
    swarm: &SwarmOptions,
    settings: &ProvisionSettings,
) -> Result<(), ProvisionError> {
    if !swarm.is_swarm {
        return Ok(());
    }

    let addr = if swarm.addr.is_empty() {
        let (host, port) = engine_endpoint(&driver.get_url().await?)?;
        format!("{host}:{port}")
    } else {
        swarm.addr.clone()
    };

    tracing::info!("Waiting for the engine on {} before joining the swarm", addr);
    wait_for_tcp(&addr, &settings.engine_wait)
        .await
        .map_err(|e| ProvisionError::EngineUnreachable {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    let image = shell_quote(&settings.swarm_image);
    let discovery = shell_quote(&swarm.discovery);
    let dir = provisioner.docker_config_dir();

    shell.exec(&format!("sudo docker pull {image}")).await?;

    if swarm.master {
        let (_, port) = engine_endpoint(&swarm.host)?;
        let master_args = format!(
            "--tlsverify --tlscacert={dir}/ca.pem --tlscert={dir}/server.pem \
             --tlskey={dir}/server-key.pem -H {} {discovery}",
            shell_quote(&swarm.host)
        );
        tracing::debug!("launching swarm master: {}", master_args);
        shell
            .exec(&format!(
                "sudo docker run -d -p {port}:{port} --restart=always --name swarm-agent-master \
                 -v {dir}:{dir} {image} manage {master_args}"
            ))
            .await?;
    }

    let node_args = format!("--addr {} {discovery}", shell_quote(&addr));
    tracing::debug!("launching swarm node: {}", node_args);
    shell
        .exec(&format!(
            "sudo docker run -d --restart=always --name swarm-agent -v {dir}:{dir} {image} join {node_args}"
        ))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverContext, State};
    use crate::host::WaitPolicy;
    use crate::provision::SystemdProvisioner;
    use crate::testing::{FakeCloud, FakeDriver, FakeShell};
    use std::path::PathBuf;
    use std::time::Duration;

    fn driver_on(port: u16) -> FakeDriver {
        let cloud = FakeCloud::new();
        cloud.set_state("node", State::Running);
        let mut driver = FakeDriver::new(
            DriverContext {
                machine_name: "node".to_string(),
                store_path: PathBuf::from("/tmp/node"),
                ca_cert_path: PathBuf::new(),
                ca_key_path: PathBuf::new(),
            },
            cloud,
        );
        driver.set_engine_port(port);
        driver
    }

    fn settings() -> ProvisionSettings {
        ProvisionSettings {
            engine_wait: WaitPolicy::new(3, Duration::from_millis(10)),
            ..Default::default()
        }
    }

    fn swarm(master: bool) -> SwarmOptions {
        SwarmOptions {
            is_swarm: true,
            discovery: "token://abc".to_string(),
            addr: String::new(),
            master,
            host: "tcp://0.0.0.0:3376".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_swarm_is_noop() {
        let shell = FakeShell::new();
        configure_swarm(
            &SystemdProvisioner,
            &shell,
            &driver_on(1),
            &SwarmOptions::default(),
            &settings(),
        )
        .await
        .unwrap();
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_master_runs_manager_and_agent() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shell = FakeShell::new();

        configure_swarm(
            &SystemdProvisioner,
            &shell,
            &driver_on(port),
            &swarm(true),
            &settings(),
        )
        .await
        .unwrap();

        let commands = shell.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], "sudo docker pull 'swarm:latest'");
        assert!(commands[1].contains("-p 3376:3376"));
        assert!(commands[1].contains("--name swarm-agent-master"));
        assert!(commands[1].contains("manage --tlsverify"));
        assert!(commands[1].ends_with("'token://abc'"));
        assert!(commands[2].ends_with(&format!("join --addr '127.0.0.1:{port}' 'token://abc'")));
    }

    #[tokio::test]
    async fn test_member_only_joins() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shell = FakeShell::new();

        configure_swarm(
            &SystemdProvisioner,
            &shell,
            &driver_on(port),
            &swarm(false),
            &settings(),
        )
        .await
        .unwrap();

        let commands = shell.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].contains("--name swarm-agent "));
    }

    #[tokio::test]
    async fn test_discovery_is_quoted() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shell = FakeShell::new();
        let mut opts = swarm(false);
        opts.discovery = "token://x; rm -rf /".to_string();

        configure_swarm(&SystemdProvisioner, &shell, &driver_on(port), &opts, &settings())
            .await
            .unwrap();
        assert!(shell.commands()[1].ends_with("'token://x; rm -rf /'"));
    }

    #[tokio::test]
    async fn test_unreachable_engine_stops_before_any_command() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let shell = FakeShell::new();

        let err = configure_swarm(
            &SystemdProvisioner,
            &shell,
            &driver_on(port),
            &swarm(true),
            &settings(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProvisionError::EngineUnreachable { .. }));
        assert!(shell.commands().is_empty());
    }
}
