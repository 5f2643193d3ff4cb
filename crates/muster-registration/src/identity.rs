//! Host identity: server-issued ids plus host-supplied description.
//!
//! The secure and insecure ids only change as a pair, and every change is
//! handed to an [`IdentityStore`] so it survives restarts.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, RegistrationResult};

/// Identity shared between the host agent and the registration handler.
pub type SharedIdentity = Arc<RwLock<Identity>>;

/// Ids as written to durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIds {
    #[serde(rename = "secure-id", default)]
    pub secure_id: Option<String>,

    #[serde(rename = "insecure-id", default)]
    pub insecure_id: Option<String>,
}

/// Durable storage for the server-issued ids.
pub trait IdentityStore: Send + Sync {
    fn load(&self) -> RegistrationResult<PersistedIds>;
    fn save(&self, ids: &PersistedIds) -> RegistrationResult<()>;
}

/// JSON file store, written atomically.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> RegistrationResult<PersistedIds> {
        if !self.path.exists() {
            return Ok(PersistedIds::default());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| RegistrationError::Identity {
                message: format!("failed to read {}: {}", self.path.display(), e),
            })?;
        serde_json::from_str(&content).map_err(|e| RegistrationError::Identity {
            message: format!("failed to parse {}: {}", self.path.display(), e),
        })
    }

    fn save(&self, ids: &PersistedIds) -> RegistrationResult<()> {
        let content =
            serde_json::to_string_pretty(ids).map_err(|e| RegistrationError::Identity {
                message: format!("failed to serialize identity: {}", e),
            })?;
        write_atomic(&self.path, &content).map_err(|e| RegistrationError::Identity {
            message: format!("failed to write {}: {}", self.path.display(), e),
        })
    }
}

/// In-process store for hosts that do not persist ids.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    ids: Mutex<PersistedIds>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> RegistrationResult<PersistedIds> {
        Ok(self.ids.lock().unwrap().clone())
    }

    fn save(&self, ids: &PersistedIds) -> RegistrationResult<()> {
        *self.ids.lock().unwrap() = ids.clone();
        Ok(())
    }
}

/// The host's credentials and self-description.
pub struct Identity {
    ids: PersistedIds,
    pub computer_title: Option<String>,
    pub account_name: Option<String>,
    pub registration_password: Option<String>,
    store: Arc<dyn IdentityStore>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("secure_id", &self.ids.secure_id)
            .field("insecure_id", &self.ids.insecure_id)
            .field("computer_title", &self.computer_title)
            .field("account_name", &self.account_name)
            .field(
                "registration_password",
                &self.registration_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Identity {
    /// Empty identity backed by `store`, with no ids loaded.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            ids: PersistedIds::default(),
            computer_title: None,
            account_name: None,
            registration_password: None,
            store,
        }
    }

    /// Host-supplied fields from `config`, ids from `store`.
    pub fn from_config(
        config: &RegistrationConfig,
        store: Arc<dyn IdentityStore>,
    ) -> RegistrationResult<Self> {
        let mut ids = store.load()?;
        if ids.secure_id.is_none() != ids.insecure_id.is_none() {
            warn!("persisted identity holds only one of secure/insecure id, discarding both");
            ids = PersistedIds::default();
        }
        Ok(Self {
            ids,
            computer_title: config.computer_title.clone(),
            account_name: config.account_name.clone(),
            registration_password: config.registration_password.clone(),
            store,
        })
    }

    pub fn into_shared(self) -> SharedIdentity {
        Arc::new(RwLock::new(self))
    }

    pub fn secure_id(&self) -> Option<&str> {
        self.ids.secure_id.as_deref()
    }

    pub fn insecure_id(&self) -> Option<&str> {
        self.ids.insecure_id.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.ids.secure_id.is_some()
    }

    /// Store a new id pair issued by the server.
    pub fn set_ids(&mut self, secure_id: impl Into<String>, insecure_id: impl Into<String>) {
        self.ids = PersistedIds {
            secure_id: Some(secure_id.into()),
            insecure_id: Some(insecure_id.into()),
        };
        self.persist();
    }

    /// Forget both ids.
    pub fn clear_ids(&mut self) {
        self.ids = PersistedIds::default();
        self.persist();
    }

    fn persist(&self) {
        // A failed write must not lose the in-memory state; the next change retries.
        match self.store.save(&self.ids) {
            Ok(()) => debug!(registered = self.is_registered(), "persisted identity"),
            Err(e) => warn!(error = %e, "failed to persist identity"),
        }
    }
}

pub(crate) fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)
}
