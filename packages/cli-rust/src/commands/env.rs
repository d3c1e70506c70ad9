//! dockhand env / config - Point the Docker client at a machine
//!
//! Both commands hand out the client material copied into the machine's own
//! directory during provisioning.

use std::path::Path;

use anyhow::Result;
use clap::{Args, ValueEnum};

use super::HostArgs;
use crate::App;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShellKind {
    Posix,
    Fish,
    Powershell,
    Cmd,
}

#[derive(Args)]
pub struct EnvArgs {
    /// Machine name (default: the active machine)
    pub name: Option<String>,

    /// Shell syntax to print
    #[arg(long, value_enum, default_value = "posix")]
    pub shell: ShellKind,

    /// Print commands that undo a previous `env`
    #[arg(short, long)]
    pub unset: bool,
}

const ENV_VARS: [&str; 4] = [
    "DOCKER_TLS_VERIFY",
    "DOCKER_HOST",
    "DOCKER_CERT_PATH",
    "DOCKER_MACHINE_NAME",
];

/// Flags for `docker $(dockhand config <name>) ...`
fn tls_flags(cert_dir: &Path, url: &str) -> String {
    let dir = cert_dir.display();
    format!(
        "--tlsverify --tlscacert=\"{dir}/ca.pem\" --tlscert=\"{dir}/cert.pem\" \
         --tlskey=\"{dir}/key.pem\" -H={url}"
    )
}

fn set_line(shell: ShellKind, key: &str, value: &str) -> String {
    match shell {
        ShellKind::Posix => format!("export {key}=\"{value}\""),
        ShellKind::Fish => format!("set -gx {key} \"{value}\";"),
        ShellKind::Powershell => format!("$Env:{key} = \"{value}\""),
        ShellKind::Cmd => format!("SET {key}={value}"),
    }
}

fn unset_line(shell: ShellKind, key: &str) -> String {
    match shell {
        ShellKind::Posix => format!("unset {key}"),
        ShellKind::Fish => format!("set -e {key};"),
        ShellKind::Powershell => format!("Remove-Item Env:\\{key}"),
        ShellKind::Cmd => format!("SET {key}="),
    }
}

fn usage_hint(shell: ShellKind, command: &str) -> String {
    match shell {
        ShellKind::Posix => format!("# eval \"$({command})\""),
        ShellKind::Fish => format!("# eval ({command})"),
        ShellKind::Powershell => format!("# & {command} | Invoke-Expression"),
        ShellKind::Cmd => format!("REM \t@FOR /f \"tokens=*\" %i IN ('{command}') DO @%i"),
    }
}

fn render_env(shell: ShellKind, name: &str, url: &str, cert_dir: &Path) -> String {
    let values = ["1", url, &cert_dir.display().to_string(), name].map(str::to_string);
    let mut lines: Vec<String> = ENV_VARS
        .iter()
        .zip(values.iter())
        .map(|(key, value)| set_line(shell, key, value))
        .collect();
    lines.push(comment(shell, "Run this command to configure your shell:"));
    lines.push(usage_hint(shell, &format!("dockhand env {name}")));
    lines.join("\n")
}

fn render_unset(shell: ShellKind) -> String {
    let mut lines: Vec<String> = ENV_VARS.iter().map(|key| unset_line(shell, key)).collect();
    lines.push(comment(shell, "Run this command to configure your shell:"));
    lines.push(usage_hint(shell, "dockhand env --unset"));
    lines.join("\n")
}

fn comment(shell: ShellKind, text: &str) -> String {
    match shell {
        ShellKind::Cmd => format!("REM {text}"),
        _ => format!("# {text}"),
    }
}

pub async fn cmd_env(app: &App, args: &EnvArgs) -> Result<()> {
    if args.unset {
        println!("{}", render_unset(args.shell));
        return Ok(());
    }

    let host = app.resolve_host(args.name.as_deref())?;
    let url = host.url().await?;
    println!(
        "{}",
        render_env(args.shell, host.name(), &url, &host.auth_options.store_path)
    );
    Ok(())
}

pub async fn cmd_config(app: &App, args: &HostArgs) -> Result<()> {
    let host = app.resolve_host(args.name.as_deref())?;
    let url = host.url().await?;
    println!("{}", tls_flags(&host.auth_options.store_path, &url));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dir() -> PathBuf {
        PathBuf::from("/home/alice/.docker/machines/web")
    }

    #[test]
    fn tls_flags_point_at_machine_dir() {
        let flags = tls_flags(&dir(), "tcp://10.0.0.5:2376");
        assert_eq!(
            flags,
            "--tlsverify --tlscacert=\"/home/alice/.docker/machines/web/ca.pem\" \
             --tlscert=\"/home/alice/.docker/machines/web/cert.pem\" \
             --tlskey=\"/home/alice/.docker/machines/web/key.pem\" -H=tcp://10.0.0.5:2376"
        );
    }

    #[test]
    fn posix_env_exports_every_variable() {
        let env = render_env(ShellKind::Posix, "web", "tcp://10.0.0.5:2376", &dir());
        assert!(env.contains("export DOCKER_TLS_VERIFY=\"1\""));
        assert!(env.contains("export DOCKER_HOST=\"tcp://10.0.0.5:2376\""));
        assert!(env.contains("export DOCKER_CERT_PATH=\"/home/alice/.docker/machines/web\""));
        assert!(env.contains("export DOCKER_MACHINE_NAME=\"web\""));
        assert!(env.ends_with("# eval \"$(dockhand env web)\""));
    }

    #[test]
    fn fish_and_powershell_syntax() {
        let fish = render_env(ShellKind::Fish, "web", "tcp://h:2376", &dir());
        assert!(fish.contains("set -gx DOCKER_HOST \"tcp://h:2376\";"));

        let ps = render_env(ShellKind::Powershell, "web", "tcp://h:2376", &dir());
        assert!(ps.contains("$Env:DOCKER_HOST = \"tcp://h:2376\""));
    }

    #[test]
    fn unset_clears_every_variable() {
        let unset = render_unset(ShellKind::Posix);
        for key in ENV_VARS {
            assert!(unset.contains(&format!("unset {key}")));
        }
    }
}
