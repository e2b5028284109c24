//! Opaque key-value persistence for session material.
//!
//! The session store only needs get/set/delete by string key; where the
//! values end up is the caller's choice:
//! - `FileKeyValueStore`: JSON file under the data directory
//! - `KeyringStore`: OS-backed secure storage (Keychain, Secret Service,
//!   Credential Manager)
//! - `MemoryKeyValueStore`: nothing survives the process
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use keyring::Entry;
use parking_lot::Mutex;

use crate::error::CoreError;

const SERVICE_NAME: &str = "com.murmur.client";
const STORE_FILE: &str = "session.json";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON-file backed store. The whole map is rewritten on every mutation.
/// On unix the file is readable by its owner only.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileKeyValueStore {
    pub fn open(data_dir: &Path) -> Result<Self, CoreError> {
        fs::create_dir_all(data_dir).map_err(CoreError::storage)?;
        let path = data_dir.join(STORE_FILE);
        let entries = Self::load_from_file(&path).unwrap_or_default();
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn load_from_file(path: &Path) -> Option<HashMap<String, String>> {
        let contents = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn save_to_file(&self, entries: &HashMap<String, String>) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(entries).map_err(CoreError::storage)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(CoreError::storage)?;

        // `mode` only applies on creation; tighten an existing file too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(CoreError::storage)?;
        }
        file.write_all(json.as_bytes()).map_err(CoreError::storage)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.save_to_file(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.save_to_file(&entries)?;
        }
        Ok(())
    }
}

/// OS keychain store, one credential per key under a fixed service name.
#[derive(Debug, Default)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(key: &str) -> Result<Entry, CoreError> {
        Entry::new(SERVICE_NAME, key).map_err(CoreError::storage)
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CoreError::storage(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        Self::entry(key)?
            .set_password(value)
            .map_err(CoreError::storage)
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CoreError::storage(e)),
        }
    }
}
