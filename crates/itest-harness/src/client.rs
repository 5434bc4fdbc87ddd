use std::net::SocketAddr;
use std::path::Path;

use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

use crate::credentials::DEFAULT_DOMAIN;
use crate::error::HarnessError;

/// Open a TLS channel to `addr` that trusts only the certificate at `cert_file`.
pub async fn connect(addr: SocketAddr, cert_file: &Path) -> Result<Channel, HarnessError> {
    let pem = tokio::fs::read(cert_file)
        .await
        .map_err(|source| HarnessError::Client {
            path: cert_file.to_path_buf(),
            source,
        })?;

    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(pem))
        .domain_name(DEFAULT_DOMAIN);

    let channel = Endpoint::from_shared(format!("https://{addr}"))?
        .tls_config(tls)?
        .connect()
        .await?;
    Ok(channel)
}
