//! Client configuration.
//!
//! Stored as YAML. The registration engine only writes back the exchange and
//! ping URLs delivered through cloud user-data; everything else is owned by
//! the operator.
//!
//! | Environment Variable | Field |
//! |---------------------|-------|
//! | `MUSTER_URL` | `url` |
//! | `MUSTER_PING_URL` | `ping_url` |
//! | `MUSTER_COMPUTER_TITLE` | `computer_title` |
//! | `MUSTER_ACCOUNT_NAME` | `account_name` |
//! | `MUSTER_REGISTRATION_PASSWORD` | `registration_password` |
//! | `MUSTER_CLOUD` | `cloud` |
//! | `MUSTER_METADATA_URL` | `metadata_url` |

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RegistrationError, RegistrationResult};
use crate::identity::write_atomic;
use crate::metadata::METADATA_API_BASE;

/// Registration-related client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Message exchange URL of the management server.
    #[serde(default = "default_url")]
    pub url: String,

    /// Ping service URL.
    #[serde(default = "default_ping_url")]
    pub ping_url: String,

    #[serde(default)]
    pub computer_title: Option<String>,

    #[serde(default)]
    pub account_name: Option<String>,

    #[serde(default)]
    pub registration_password: Option<String>,

    /// Register as a cloud instance using provider metadata.
    #[serde(default)]
    pub cloud: bool,

    /// Base URL of the cloud metadata service.
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    /// Where the issued ids are persisted.
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Metadata fetch timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "https://muster.example.com/message-system".to_string()
}

fn default_ping_url() -> String {
    "http://muster.example.com/ping".to_string()
}

fn default_metadata_url() -> String {
    METADATA_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ping_url: default_ping_url(),
            computer_title: None,
            account_name: None,
            registration_password: None,
            cloud: false,
            metadata_url: default_metadata_url(),
            data_path: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl RegistrationConfig {
    /// Default config file location (`<config dir>/muster/client.yaml`).
    pub fn default_path() -> RegistrationResult<PathBuf> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| RegistrationError::Config {
                message: "could not determine config directory".to_string(),
            })?;
        Ok(base.join("muster").join("client.yaml"))
    }

    /// Load from a YAML file.
    pub fn load(path: &Path) -> RegistrationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistrationError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_yaml::from_str(&content).map_err(|e| RegistrationError::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    /// Load from a YAML file, or defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> RegistrationResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write as YAML, replacing the file atomically.
    pub fn save(&self, path: &Path) -> RegistrationResult<()> {
        let content = serde_yaml::to_string(self).map_err(|e| RegistrationError::Config {
            message: format!("failed to serialize config: {}", e),
        })?;
        write_atomic(path, &content).map_err(|e| RegistrationError::Config {
            message: format!("failed to write {}: {}", path.display(), e),
        })
    }

    /// Override fields from `MUSTER_*` environment variables.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("MUSTER_URL") {
            self.url = url;
        }
        if let Ok(url) = std::env::var("MUSTER_PING_URL") {
            self.ping_url = url;
        }
        if let Ok(title) = std::env::var("MUSTER_COMPUTER_TITLE") {
            self.computer_title = non_empty(title);
        }
        if let Ok(account) = std::env::var("MUSTER_ACCOUNT_NAME") {
            self.account_name = non_empty(account);
        }
        if let Ok(password) = std::env::var("MUSTER_REGISTRATION_PASSWORD") {
            self.registration_password = non_empty(password);
        }
        if let Ok(cloud) = std::env::var("MUSTER_CLOUD") {
            self.cloud = cloud == "1" || cloud.eq_ignore_ascii_case("true");
        }
        if let Ok(url) = std::env::var("MUSTER_METADATA_URL") {
            self.metadata_url = url;
        }
        self
    }

    /// Identity file location, defaulting under the user data directory.
    pub fn data_path(&self) -> RegistrationResult<PathBuf> {
        if let Some(path) = &self.data_path {
            return Ok(path.clone());
        }
        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| RegistrationError::Config {
                message: "could not determine data directory".to_string(),
            })?;
        Ok(base.join("muster").join("identity.json"))
    }

    pub fn with_account(mut self, account_name: impl Into<String>) -> Self {
        self.account_name = Some(account_name.into());
        self
    }

    pub fn with_computer_title(mut self, title: impl Into<String>) -> Self {
        self.computer_title = Some(title.into());
        self
    }

    pub fn with_cloud(mut self, cloud: bool) -> Self {
        self.cloud = cloud;
        self
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Durable configuration the registration engine may update.
pub trait ConfigStore: Send + Sync {
    fn set_exchange_url(&self, url: &str) -> RegistrationResult<()>;
    fn set_ping_url(&self, url: &str) -> RegistrationResult<()>;
}

/// [`ConfigStore`] writing back to a YAML file.
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    config: Mutex<RegistrationConfig>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: RegistrationConfig) -> Self {
        Self {
            path: path.into(),
            config: Mutex::new(config),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> RegistrationResult<Self> {
        let path = path.into();
        let config = RegistrationConfig::load_or_default(&path)?;
        Ok(Self::new(path, config))
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> RegistrationConfig {
        self.config.lock().unwrap().clone()
    }

    fn update(&self, apply: impl FnOnce(&mut RegistrationConfig)) -> RegistrationResult<()> {
        let mut config = self.config.lock().unwrap();
        let mut updated = config.clone();
        apply(&mut updated);
        updated.save(&self.path)?;
        *config = updated;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn set_exchange_url(&self, url: &str) -> RegistrationResult<()> {
        info!(url, "persisting exchange url");
        self.update(|config| config.url = url.to_string())
    }

    fn set_ping_url(&self, url: &str) -> RegistrationResult<()> {
        info!(url, "persisting ping url");
        self.update(|config| config.ping_url = url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_load_applies_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.yaml");
        std::fs::write(&path, "account_name: onward\ncloud: true\n").unwrap();

        let config = RegistrationConfig::load(&path).unwrap();
        assert_eq!(config.account_name.as_deref(), Some("onward"));
        assert!(config.cloud);
        assert_eq!(config.metadata_url, METADATA_API_BASE);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.computer_title, None);
    }

    #[test]
    fn test_load_rejects_bad_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.yaml");
        std::fs::write(&path, "cloud: [not, a, bool]\n").unwrap();

        assert!(matches!(
            RegistrationConfig::load(&path),
            Err(RegistrationError::Config { .. })
        ));
    }

    #[test]
    fn test_file_store_writes_urls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.yaml");
        let store = FileConfigStore::new(&path, RegistrationConfig::default().with_account("a"));

        store
            .set_exchange_url("https://example.com/message-system")
            .unwrap();
        store.set_ping_url("http://example.com/ping").unwrap();

        let reloaded = RegistrationConfig::load(&path).unwrap();
        assert_eq!(reloaded.url, "https://example.com/message-system");
        assert_eq!(reloaded.ping_url, "http://example.com/ping");
        assert_eq!(reloaded.account_name.as_deref(), Some("a"));
        assert_eq!(store.config(), reloaded);
    }

    #[test]
    fn test_open_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::open(temp_dir.path().join("absent.yaml")).unwrap();
        assert_eq!(store.config(), RegistrationConfig::default());
    }

    #[test]
    #[serial]
    fn test_apply_env_overrides() {
        std::env::set_var("MUSTER_ACCOUNT_NAME", "from-env");
        std::env::set_var("MUSTER_CLOUD", "true");
        std::env::set_var("MUSTER_COMPUTER_TITLE", "");

        let config = RegistrationConfig::default()
            .with_computer_title("configured")
            .apply_env();

        std::env::remove_var("MUSTER_ACCOUNT_NAME");
        std::env::remove_var("MUSTER_CLOUD");
        std::env::remove_var("MUSTER_COMPUTER_TITLE");

        assert_eq!(config.account_name.as_deref(), Some("from-env"));
        assert!(config.cloud);
        assert_eq!(config.computer_title, None);
    }

    #[test]
    fn test_explicit_data_path_wins() {
        let config = RegistrationConfig {
            data_path: Some(PathBuf::from("/var/lib/muster/identity.json")),
            ..RegistrationConfig::default()
        };
        assert_eq!(
            config.data_path().unwrap(),
            PathBuf::from("/var/lib/muster/identity.json")
        );
    }

    #[test]
    fn test_failed_save_keeps_previous_config() {
        let temp_dir = TempDir::new().unwrap();
        // Parent is a regular file, so the write cannot land.
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store =
            FileConfigStore::new(blocker.join("client.yaml"), RegistrationConfig::default());

        assert!(store
            .set_exchange_url("https://example.com/message-system")
            .is_err());
        assert_eq!(store.config(), RegistrationConfig::default());
    }
}
