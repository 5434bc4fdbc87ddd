use serde::Deserialize;

use crate::credentials::CertOptions;

/// Configuration of one mock server harness.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// `host:port` to listen on. Port 0 picks a free port; see `ServerHarness::local_addr`.
    pub listen_addr: String,
    /// Prefix of the scratch directory holding the credential files (default `"itest"`).
    #[serde(default = "default_temp_dir_prefix")]
    pub temp_dir_prefix: String,
    /// Certificate file name inside the scratch directory (default `"tls.cert"`).
    #[serde(default = "default_cert_file_name")]
    pub cert_file_name: String,
    /// Private key file name inside the scratch directory (default `"tls.key"`).
    #[serde(default = "default_key_file_name")]
    pub key_file_name: String,
    /// Self-signed certificate parameters.
    #[serde(default)]
    pub cert: CertOptions,
    /// Leave the scratch directory on disk after the harness is dropped (default false).
    #[serde(default)]
    pub keep_credentials: bool,
}

impl HarnessConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            ..Self::default()
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_owned(),
            temp_dir_prefix: default_temp_dir_prefix(),
            cert_file_name: default_cert_file_name(),
            key_file_name: default_key_file_name(),
            cert: CertOptions::default(),
            keep_credentials: false,
        }
    }
}

impl itest_core::config::Config for HarnessConfig {}

fn default_temp_dir_prefix() -> String {
    "itest".to_owned()
}

fn default_cert_file_name() -> String {
    "tls.cert".to_owned()
}

fn default_key_file_name() -> String {
    "tls.key".to_owned()
}
