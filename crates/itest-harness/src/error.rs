use std::path::PathBuf;

/// Failures of the credential provisioner, one variant per stage.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("unable to generate cert pair: {0}")]
    Generate(#[from] rcgen::Error),
    #[error("unable to generate cert pair: validity window out of range")]
    InvalidValidity,
    #[error("unable to write cert pair to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to load cert file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to load cert file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Errors surfaced synchronously by the harness.
///
/// Serve-loop failures are not part of this enum; they travel through the
/// one-shot serve signal instead.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("mock server already started")]
    AlreadyStarted,
    #[error("mock server is not running")]
    NotRunning,
    #[error("unable to create temp dir: {0}")]
    TempDir(#[source] std::io::Error),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("unable to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to resolve bound address: {0}")]
    LocalAddr(#[source] std::io::Error),
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("serve task panicked: {0}")]
    TaskPanicked(#[source] tokio::task::JoinError),
    #[error("unable to read trusted cert {path}: {source}")]
    Client {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    /// Whether this error came out of the credential provisioning stage.
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::TempDir(_) | Self::Credentials(_))
    }
}
