use std::path::{Path, PathBuf};

/// Errors raised while loading a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Trait for loading harness configuration from JSON documents.
///
/// Implementors derive `serde::Deserialize` (usually with `#[serde(default)]`
/// on optional fields) and pick whichever loader fits the test.
pub trait Config: Sized + serde::de::DeserializeOwned {
    fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Load a fixture at `workspace_root/relative_path`.
    fn from_fixture(relative_path: &str) -> Result<Self, ConfigError> {
        Self::from_file(workspace_root().join(relative_path))
    }
}

/// Walk up from the current crate's manifest dir to the directory holding `Cargo.lock`.
///
/// Falls back to the manifest dir itself (or the working directory outside cargo).
pub fn workspace_root() -> PathBuf {
    let start = std::env::var_os("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();
    start
        .ancestors()
        .find(|p| p.join("Cargo.lock").exists())
        .unwrap_or(&start)
        .to_path_buf()
}
