//! Remote shell access
//!
//! Provisioning talks to machines only through [`RemoteShell`]. The default
//! implementation shells out to the OpenSSH client. File content is always
//! streamed over stdin, never interpolated into a command line.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;

/// How long a reachability check waits for the SSH port
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from running commands on a remote host
#[derive(Error, Debug)]
pub enum ShellError {
    /// Failed to spawn the SSH process
    #[error("Failed to spawn SSH: {0}")]
    Spawn(String),

    /// The SSH port is not accepting connections
    #[error("{addr} is not reachable: {reason}")]
    Unreachable { addr: String, reason: String },

    /// The remote command exited non-zero
    #[error("Remote command failed (exit {status}): {command}\n{output}")]
    Failed {
        command: String,
        status: i32,
        output: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout and stderr together, for diagnostics
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// How to reach a machine over SSH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub key_path: Option<PathBuf>,
}

impl SshTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// A shell on a remote machine
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Whether the SSH port accepts TCP connections
    async fn reachable(&self) -> Result<(), ShellError>;

    /// Run a command, capturing its output whatever the exit status
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError>;

    /// Write `contents` to `path` as root
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), ShellError>;

    /// Run a command and fail on non-zero exit
    async fn exec(&self, command: &str) -> Result<String, ShellError> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ShellError::Failed {
                command: command.to_string(),
                status: output.status,
                output: output.combined(),
            })
        }
    }
}

/// Opens shells for SSH targets
pub trait ShellFactory: Send + Sync {
    fn connect(&self, target: SshTarget) -> Box<dyn RemoteShell>;
}

/// Single-quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Build the ssh invocation for a target
///
/// `batch` disables prompts so failures surface instead of hanging.
pub fn build_ssh_command(target: &SshTarget, batch: bool) -> std::process::Command {
    let mut cmd = std::process::Command::new("ssh");

    if batch {
        cmd.arg("-o").arg("BatchMode=yes");
    }
    cmd.arg("-o")
        .arg("ConnectTimeout=30")
        .arg("-o")
        .arg("StrictHostKeyChecking=accept-new")
        .arg("-o")
        .arg("LogLevel=quiet");

    cmd.arg("-p").arg(target.port.to_string());
    if let Some(key) = &target.key_path {
        cmd.arg("-o").arg("IdentitiesOnly=yes");
        cmd.arg("-i").arg(key);
    }

    cmd.arg(format!("{}@{}", target.user, target.hostname));
    cmd
}

fn spawn_error(e: std::io::Error) -> ShellError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ShellError::Spawn("SSH not found. Install OpenSSH client.".to_string())
    } else {
        ShellError::Spawn(e.to_string())
    }
}

/// [`RemoteShell`] over the system `ssh` binary
#[derive(Debug, Clone)]
pub struct SshShell {
    target: SshTarget,
}

impl SshShell {
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::from(build_ssh_command(&self.target, true));
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn reachable(&self) -> Result<(), ShellError> {
        let addr = self.target.addr();
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ShellError::Unreachable {
                addr,
                reason: e.to_string(),
            }),
            Err(_) => Err(ShellError::Unreachable {
                addr,
                reason: "connection timed out".to_string(),
            }),
        }
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        tracing::debug!("ssh {}: {}", self.target.hostname, command);

        let output = self
            .command()
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(spawn_error)?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), ShellError> {
        let command = format!("sudo tee {} >/dev/null", shell_quote(path));
        tracing::debug!(
            "ssh {}: writing {} bytes to {}",
            self.target.hostname,
            contents.len(),
            path
        );

        let mut child = self
            .command()
            .arg(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ShellError::Failed {
                command,
                status: output.status.code().unwrap_or(-1),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Default factory producing [`SshShell`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SshShellFactory;

impl ShellFactory for SshShellFactory {
    fn connect(&self, target: SshTarget) -> Box<dyn RemoteShell> {
        Box::new(SshShell::new(target))
    }
}
