//! Local certificate authority
//!
//! Mints the X.509 material used for mutual TLS between the Docker client and
//! every provisioned engine:
//! - a self-signed CA whose private key never leaves this machine
//! - one client certificate shared by every host
//! - one server certificate per host, bound to the host's IP

mod error;

pub use error::CertError;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;

use chrono::{Duration as ChronoDuration, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder, X509StoreContext};

use crate::config::MachinePaths;

/// Certificates are valid from 5 minutes in the past to tolerate clock skew
const NOT_BEFORE_SKEW_MINUTES: i64 = 5;

/// Lifetime of every issued certificate
const VALIDITY_DAYS: i64 = 1080;

/// Serial numbers are drawn from a 128-bit space
const SERIAL_BITS: i32 = 128;

/// PEM-encoded certificate and private key
#[derive(Debug, Clone)]
pub struct CertificatePair {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Generate a self-signed certificate authority
///
/// Refuses to run when either output file exists; regenerating the CA would
/// silently invalidate trust on every host provisioned with the old one.
pub fn generate_ca_certificate(
    cert_path: &Path,
    key_path: &Path,
    org: &str,
    bits: u32,
) -> Result<(), CertError> {
    for path in [cert_path, key_path] {
        if path.exists() {
            return Err(CertError::AlreadyExists(path.to_path_buf()));
        }
    }

    let rsa = Rsa::generate(bits)?;
    let key_pem = rsa.private_key_to_pem()?;
    let key = PKey::from_rsa(rsa)?;

    let subject = build_name(org, Some(&format!("{org} CA")))?;
    let mut builder = new_builder(&subject, &key)?;
    builder.set_issuer_name(&subject)?;

    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .key_cert_sign()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    let subject_key_id = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(subject_key_id)?;

    builder.sign(&key, MessageDigest::sha256())?;
    let cert = builder.build();

    write_pem(cert_path, &cert.to_pem()?, false)?;
    write_pem(key_path, &key_pem, true)?;

    tracing::debug!("Generated CA certificate: {}", cert_path.display());
    Ok(())
}

/// Generate a certificate signed by the CA and write it to disk
///
/// A single empty host entry yields a client certificate; anything else a
/// server certificate whose SAN lists each entry as an IP or DNS name.
pub fn generate_cert(
    hosts: &[&str],
    cert_path: &Path,
    key_path: &Path,
    ca_cert_path: &Path,
    ca_key_path: &Path,
    org: &str,
    bits: u32,
) -> Result<(), CertError> {
    let pair = issue_certificate(hosts, ca_cert_path, ca_key_path, org, bits)?;
    write_pem(cert_path, &pair.cert_pem, false)?;
    write_pem(key_path, &pair.key_pem, true)?;
    tracing::debug!("Generated certificate: {}", cert_path.display());
    Ok(())
}

/// Issue a CA-signed certificate without touching the filesystem
pub fn issue_certificate(
    hosts: &[&str],
    ca_cert_path: &Path,
    ca_key_path: &Path,
    org: &str,
    bits: u32,
) -> Result<CertificatePair, CertError> {
    let ca_cert = X509::from_pem(&read_file(ca_cert_path)?)?;
    let ca_key = PKey::private_key_from_pem(&read_file(ca_key_path)?)?;

    let rsa = Rsa::generate(bits)?;
    let key_pem = rsa.private_key_to_pem()?;
    let key = PKey::from_rsa(rsa)?;

    let subject = build_name(org, None)?;
    let mut builder = new_builder(&subject, &key)?;
    builder.set_issuer_name(ca_cert.subject_name())?;
    builder.append_extension(BasicConstraints::new().build()?)?;

    if is_client_request(hosts) {
        builder.append_extension(ExtendedKeyUsage::new().client_auth().server_auth().build()?)?;
        builder.append_extension(KeyUsage::new().digital_signature().build()?)?;
    } else {
        builder.append_extension(
            KeyUsage::new()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        let mut san = SubjectAlternativeName::new();
        for host in hosts {
            if host.is_empty() {
                return Err(CertError::InvalidHost(
                    "empty host in a server certificate request".to_string(),
                ));
            }
            match host.parse::<IpAddr>() {
                Ok(_) => san.ip(host),
                Err(_) => san.dns(host),
            };
        }
        let san = san.build(&builder.x509v3_context(Some(&ca_cert), None))?;
        builder.append_extension(san)?;
    }

    let authority_key_id = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(&ca_cert), None))?;
    builder.append_extension(authority_key_id)?;

    builder.sign(&ca_key, MessageDigest::sha256())?;
    let cert = builder.build();

    Ok(CertificatePair {
        cert_pem: cert.to_pem()?,
        key_pem,
    })
}

/// Check that `cert_path` chains to the CA at `ca_cert_path`
///
/// Returns `Ok(false)` when the chain does not verify, `Err` only when the
/// files themselves cannot be read or parsed.
pub fn verify_certificate(cert_path: &Path, ca_cert_path: &Path) -> Result<bool, CertError> {
    let cert = X509::from_pem(&read_file(cert_path)?)?;
    let ca_cert = X509::from_pem(&read_file(ca_cert_path)?)?;

    let mut store = X509StoreBuilder::new()?;
    store.add_cert(ca_cert)?;
    let store = store.build();

    let chain = Stack::new()?;
    let mut ctx = X509StoreContext::new()?;
    let verified = ctx.init(&store, &cert, &chain, |c| {
        let ok = c.verify_cert()?;
        if !ok {
            tracing::debug!("Certificate verification failed: {}", c.error());
        }
        Ok(ok)
    })?;

    Ok(verified)
}

/// First-time local trust bootstrap
///
/// Creates the machine directory tree, the CA pair and the client pair when
/// missing, then places the CA certificate next to the client material.
/// Safe to call repeatedly.
pub fn setup_machine_certificates(
    paths: &MachinePaths,
    org: &str,
    bits: u32,
) -> Result<(), CertError> {
    for dir in [
        paths.machine_dir().to_path_buf(),
        paths.ca_dir(),
        paths.client_cert_dir(),
    ] {
        create_private_dir(&dir)?;
    }

    let ca_cert = paths.ca_cert_path();
    let ca_key = paths.ca_key_path();
    match (ca_cert.exists(), ca_key.exists()) {
        (true, true) => {}
        (false, false) => {
            tracing::info!("Creating CA: {}", ca_cert.display());
            generate_ca_certificate(&ca_cert, &ca_key, org, bits)?;
        }
        (false, true) => return Err(CertError::OrphanedKey(ca_key)),
        (true, false) => return Err(CertError::MissingKey(ca_key)),
    }

    let client_cert = paths.client_cert_path();
    let client_key = paths.client_key_path();
    if !client_cert.exists() {
        if client_key.exists() {
            return Err(CertError::OrphanedKey(client_key));
        }
        tracing::info!("Creating client certificate: {}", client_cert.display());
        generate_cert(&[""], &client_cert, &client_key, &ca_cert, &ca_key, org, bits)?;
    }

    let client_ca = paths.client_cert_dir().join("ca.pem");
    if !client_ca.exists() {
        fs::copy(&ca_cert, &client_ca).map_err(|e| CertError::io(&client_ca, e))?;
    }

    Ok(())
}

fn is_client_request(hosts: &[&str]) -> bool {
    matches!(hosts, [""])
}

fn build_name(org: &str, common_name: Option<&str>) -> Result<X509Name, CertError> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, org)?;
    if let Some(cn) = common_name {
        name.append_entry_by_nid(Nid::COMMONNAME, cn)?;
    }
    Ok(name.build())
}

fn new_builder(subject: &X509Name, key: &PKey<Private>) -> Result<X509Builder, CertError> {
    let now = Utc::now();
    let not_before = now - ChronoDuration::minutes(NOT_BEFORE_SKEW_MINUTES);
    let not_after = not_before + ChronoDuration::days(VALIDITY_DAYS);

    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial: openssl::asn1::Asn1Integer = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(subject)?;
    builder.set_pubkey(key)?;
    let not_before: Asn1Time = Asn1Time::from_unix(not_before.timestamp())?;
    let not_after: Asn1Time = Asn1Time::from_unix(not_after.timestamp())?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    Ok(builder)
}

fn read_file(path: &Path) -> Result<Vec<u8>, CertError> {
    fs::read(path).map_err(|e| CertError::io(path, e))
}

fn create_private_dir(dir: &Path) -> Result<(), CertError> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| CertError::io(dir, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| CertError::io(dir, e))?;
    }
    Ok(())
}

fn write_pem(path: &Path, contents: &[u8], private: bool) -> Result<(), CertError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| CertError::io(path, e))?;
    file.write_all(contents).map_err(|e| CertError::io(path, e))
}
