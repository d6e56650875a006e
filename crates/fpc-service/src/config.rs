//! HAL configuration.
//!
//! Every field has a default matching the stock device, so a configuration
//! file only needs to name what differs.
//!
//! ```
//! use fpc_service::HalConfig;
//!
//! let config: HalConfig = serde_json::from_str(r#"{ "worker": { "transition_timeout_ms": 500 } }"#).unwrap();
//! assert_eq!(config.worker.transition_timeout_ms, 500);
//! assert_eq!(config.applet.fingerprint_name, "tzfingerprint");
//! ```

use std::fs;
use std::path::Path;

use fpc_core::{
    Error, Result,
    constants::{MAX_STORAGE_PATH_LENGTH, USER_DB_FILE_NAME},
};
use fpc_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where the trustlets live and how the HAL talks to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppletConfig {
    pub fingerprint_path: String,
    pub fingerprint_name: String,
    /// Command buffer size of the fingerprint trustlet.
    pub fingerprint_shared_len: usize,

    pub keymaster_path: String,
    /// Keymaster image names, tried in order.
    pub keymaster_names: Vec<String>,
    /// Command buffer size of the keymaster trustlet. The first 64 bytes
    /// hold the request, the rest the response.
    pub keymaster_shared_len: usize,

    /// Database file name inside the storage directory.
    pub database_file_name: String,
    pub max_path_length: usize,
}

impl Default for AppletConfig {
    fn default() -> Self {
        Self {
            fingerprint_path: "/system/etc/firmware/".to_string(),
            fingerprint_name: "tzfingerprint".to_string(),
            fingerprint_shared_len: 128,
            keymaster_path: "/firmware/image/".to_string(),
            keymaster_names: vec!["keymaste".to_string(), "keymaster".to_string()],
            keymaster_shared_len: 1024,
            database_file_name: USER_DB_FILE_NAME.to_string(),
            max_path_length: MAX_STORAGE_PATH_LENGTH,
        }
    }
}

/// Complete HAL configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub worker: WorkerConfig,
    pub applet: AppletConfig,
}

impl HalConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it is not valid configuration JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: HalConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HalConfig::default();
        assert_eq!(config.worker.transition_timeout_ms, 3000);
        assert_eq!(config.applet.keymaster_names, ["keymaste", "keymaster"]);
        assert_eq!(config.applet.database_file_name, "user.db");
        assert_eq!(config.applet.max_path_length, 4096);
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "applet": {{ "keymaster_names": ["km"] }} }}"#).unwrap();

        let config = HalConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.applet.keymaster_names, ["km"]);
        assert_eq!(config.applet.fingerprint_shared_len, 128);
        assert_eq!(config.worker, WorkerConfig::default());
    }

    #[test]
    fn test_from_json_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            HalConfig::from_json_file(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_json_file_missing() {
        assert!(matches!(
            HalConfig::from_json_file("/nonexistent/fpc.json"),
            Err(Error::Io(_))
        ));
    }
}
