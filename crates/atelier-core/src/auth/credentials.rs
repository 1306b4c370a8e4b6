//! Credential persistence.
//!
//! A `Credential` is always stored and removed as one value: every backend
//! keeps the access token, refresh token, and user profile in a single
//! document, so no reader can observe one slot without the others.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::StoreError;
use crate::config::{Config, StorageBackend};
use crate::models::Profile;

/// Session file name in the cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain account under which the credential document is stored
const KEYRING_ACCOUNT: &str = "session";

/// Access/refresh token pair plus the user they were issued to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Profile,
}

// Tokens are bearer secrets; keep them out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user", &self.user.email)
            .finish()
    }
}

/// Storage for the current credential.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<Credential>, StoreError>;

    /// Replace the stored credential as a whole.
    fn set(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Remove the stored credential. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StoreError>;

    /// Whether an access token is stored. Expiry is not checked.
    fn is_present(&self) -> Result<bool, StoreError> {
        Ok(self
            .get()?
            .map(|c| !c.access_token.is_empty())
            .unwrap_or(false))
    }
}

/// Open the backend selected in `config`.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.storage {
        StorageBackend::Memory => Arc::new(MemoryCredentialStore::new()),
        StorageBackend::File => Arc::new(FileCredentialStore::new(config.cache_dir()?)),
        StorageBackend::Keyring => Arc::new(KeyringCredentialStore::new(&config.keyring_service)),
    };
    debug!(backend = ?config.storage, "Credential store opened");
    Ok(store)
}

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.slot.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn set(&self, credential: &Credential) -> Result<(), StoreError> {
        *self.slot.lock().map_err(|_| StoreError::Poisoned)? = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot.lock().map_err(|_| StoreError::Poisoned)? = None;
        Ok(())
    }
}

/// JSON session file in the cache directory.
///
/// Writes go to a sibling temp file which is then renamed over the session
/// file, so a crash mid-write leaves either the old or the new credential.
pub struct FileCredentialStore {
    cache_dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
        std::fs::write(path, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<Credential>, StoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn set(&self, credential: &Credential) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let contents = serde_json::to_string_pretty(credential)?;
        let tmp = self.cache_dir.join(format!("{}.tmp", SESSION_FILE));
        Self::write_private(&tmp, &contents)?;
        std::fs::rename(&tmp, self.path())?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// OS keychain store. The whole credential is one secret.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, KEYRING_ACCOUNT)?)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self) -> Result<Option<Credential>, StoreError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(serde_json::from_str(&secret)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, credential: &Credential) -> Result<(), StoreError> {
        let secret = serde_json::to_string(credential)?;
        self.entry()?.set_password(&secret)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
