//! Self-signed TLS identity for the mock server.
//!
//! The pair is generated in memory, written to disk and then read back, so the
//! server is always secured by exactly what a paired client will trust.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tonic::transport::{Identity, ServerTlsConfig};
use tracing::debug;

use crate::error::CredentialError;

/// 14 months of 30 days.
pub const DEFAULT_VALIDITY_DAYS: u32 = 14 * 30;

/// Organization written into every autogenerated certificate.
pub const DEFAULT_ORGANIZATION: &str = "itest autogenerated cert";

/// Host name the certificate is always valid for; clients use it for SNI.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Parameters of a generated certificate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CertOptions {
    pub organization: String,
    pub validity_days: u32,
    /// Additional DNS names on top of `localhost`.
    pub extra_domains: Vec<String>,
    /// Additional IP addresses on top of the loopback addresses.
    pub extra_ips: Vec<IpAddr>,
}

impl Default for CertOptions {
    fn default() -> Self {
        Self {
            organization: DEFAULT_ORGANIZATION.to_owned(),
            validity_days: DEFAULT_VALIDITY_DAYS,
            extra_domains: Vec::new(),
            extra_ips: Vec::new(),
        }
    }
}

impl CertOptions {
    fn subject_alt_names(&self) -> Vec<String> {
        let loopback = [
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        ];
        std::iter::once(DEFAULT_DOMAIN.to_owned())
            .chain(self.extra_domains.iter().cloned())
            .chain(loopback.iter().chain(&self.extra_ips).map(IpAddr::to_string))
            .collect()
    }
}

/// PEM-encoded certificate and private key, plus the validity window baked into the cert.
#[derive(Clone)]
pub struct CredentialPair {
    pub cert_pem: String,
    pub key_pem: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Generate a self-signed ECDSA P-256 certificate valid from now for `validity_days`.
pub fn generate_cert_pair(options: &CertOptions) -> Result<CredentialPair, CredentialError> {
    let not_before = Utc::now();
    let not_after = Duration::try_days(i64::from(options.validity_days))
        .and_then(|validity| not_before.checked_add_signed(validity))
        .ok_or(CredentialError::InvalidValidity)?;

    let mut params = CertificateParams::new(options.subject_alt_names())?;
    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, options.organization.as_str());
    name.push(DnType::CommonName, DEFAULT_DOMAIN);
    params.distinguished_name = name;
    params.not_before = to_offset_date_time(not_before)?;
    params.not_after = to_offset_date_time(not_after)?;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok(CredentialPair {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        not_before,
        not_after,
    })
}

/// Write the pair to disk. The key file is only readable by the owner.
pub async fn write_cert_pair(
    cert_path: &Path,
    key_path: &Path,
    pair: &CredentialPair,
) -> Result<(), CredentialError> {
    write_file(cert_path, pair.cert_pem.as_bytes(), 0o644).await?;
    write_file(key_path, pair.key_pem.as_bytes(), 0o600).await
}

/// Re-read a pair from disk into server-side TLS settings.
pub async fn load_server_tls(
    cert_path: &Path,
    key_path: &Path,
) -> Result<ServerTlsConfig, CredentialError> {
    let cert_pem = read_file(cert_path).await?;
    let key_pem = read_file(key_path).await?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| parse_error(cert_path, format!("failed to parse certificates: {e}")))?;
    if certs.is_empty() {
        return Err(parse_error(cert_path, "no certificate found"));
    }

    rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| parse_error(key_path, format!("failed to parse private key: {e}")))?
        .ok_or_else(|| parse_error(key_path, "no private key found"))?;

    Ok(ServerTlsConfig::new().identity(Identity::from_pem(cert_pem, key_pem)))
}

/// Generate, persist and reload a fresh pair. No stage is retried.
pub async fn provision(
    cert_path: &Path,
    key_path: &Path,
    options: &CertOptions,
) -> Result<ServerTlsConfig, CredentialError> {
    let pair = generate_cert_pair(options)?;
    write_cert_pair(cert_path, key_path, &pair).await?;
    debug!(
        cert = %cert_path.display(),
        not_after = %pair.not_after,
        "wrote self-signed cert pair"
    );
    load_server_tls(cert_path, key_path).await
}

fn to_offset_date_time(at: DateTime<Utc>) -> Result<OffsetDateTime, CredentialError> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|_| CredentialError::InvalidValidity)
}

#[cfg_attr(not(unix), allow(unused_variables))]
async fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), CredentialError> {
    let write_error = |source| CredentialError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let mut file = options.open(path).await.map_err(write_error)?;
    file.write_all(contents).await.map_err(write_error)?;
    file.flush().await.map_err(write_error)
}

async fn read_file(path: &Path) -> Result<Vec<u8>, CredentialError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_error(path: &Path, reason: impl Into<String>) -> CredentialError {
    CredentialError::Parse {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
