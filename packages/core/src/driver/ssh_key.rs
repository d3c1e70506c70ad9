//! SSH key pairs for drivers that create their own machines

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::bn::BigNumRef;
use openssl::rsa::Rsa;

use super::error::DriverError;
use crate::cert::CertError;

/// Generate an RSA key pair at `private_path` and `<private_path>.pub`
///
/// The private key is PKCS#1 PEM (mode 0600); the public key is a single
/// OpenSSH `ssh-rsa` line. Returns the public key line.
pub fn generate_ssh_key(private_path: &Path, bits: u32) -> Result<Vec<u8>, DriverError> {
    let rsa = Rsa::generate(bits).map_err(CertError::from)?;
    let private_pem = rsa.private_key_to_pem().map_err(CertError::from)?;

    let mut blob = Vec::new();
    put_string(&mut blob, b"ssh-rsa");
    put_mpint(&mut blob, rsa.e());
    put_mpint(&mut blob, rsa.n());

    let comment = whoami::fallible::hostname().unwrap_or_else(|_| "dockhand".to_string());
    let public_line = format!("ssh-rsa {} {}\n", STANDARD.encode(&blob), comment);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(private_path)?.write_all(&private_pem)?;
    fs::write(public_key_path(private_path), public_line.as_bytes())?;

    tracing::debug!("Generated SSH key: {}", private_path.display());
    Ok(public_line.into_bytes())
}

pub(crate) fn public_key_path(private_path: &Path) -> PathBuf {
    let mut name = private_path.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

fn put_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

fn put_mpint(buf: &mut Vec<u8>, n: &BigNumRef) {
    let mut bytes = n.to_vec();
    if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    put_string(buf, &bytes);
}
