//! Persisted configuration entry and its on-disk store.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::model::TrackedSite;
use crate::ports::TokenListener;

/// Version written into new entries.
pub const ENTRY_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
/// Errors raised while reading or writing the config entry.
pub enum StoreError {
    /// Reading or writing the file failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The file does not hold a valid entry.
    #[error("Invalid entry file: {0}")]
    Serde(#[from] serde_json::Error),
    /// An update was requested before any entry was created.
    #[error("No config entry")]
    NoEntry,
    /// A previous writer panicked while holding the entry.
    #[error("Config entry lock poisoned")]
    Poisoned,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Data persisted for one configured account.
pub struct EntryData {
    /// Latest refresh token issued by the backend.
    pub refresh_token: String,
    /// Sites selected for tracking.
    pub sites: Vec<TrackedSite>,
}

impl fmt::Debug for EntryData {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EntryData")
            .field("refresh_token", &"[REDACTED]")
            .field("sites", &self.sites)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A configured integration instance.
pub struct ConfigEntry {
    /// Format version.
    pub version: u32,
    /// Display title.
    pub title: String,
    /// Account e-mail, unique per entry.
    pub unique_id: String,
    /// Persisted data.
    pub data: EntryData,
}

/// JSON file holding the config entry, rewritten on every change.
#[derive(Debug)]
pub struct EntryStore {
    path: PathBuf,
    entry: Mutex<Option<ConfigEntry>>,
}

impl EntryStore {
    /// Open the store, loading an existing entry if the file exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the file exists but cannot be read or
    /// parsed.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let entry = match fs::read_to_string(&path) {
            Ok(raw) => Some(serde_json::from_str::<ConfigEntry>(&raw)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), loaded = entry.is_some(), "opened entry store");
        Ok(Self {
            path,
            entry: Mutex::new(entry),
        })
    }

    /// Copy of the current entry, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn entry(&self) -> Result<Option<ConfigEntry>, StoreError> {
        Ok(self.lock()?.clone())
    }

    /// Replace the entry and persist it.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the file cannot be written.
    pub fn save(&self, entry: ConfigEntry) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        self.write(&entry)?;
        *guard = Some(entry);
        Ok(())
    }

    /// Store a new refresh token in the existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoEntry`] when nothing is configured yet, or a
    /// write error.
    pub fn update_token(&self, refresh_token: &str) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let mut entry = guard.clone().ok_or(StoreError::NoEntry)?;
        if entry.data.refresh_token == refresh_token {
            return Ok(());
        }
        entry.data.refresh_token = refresh_token.to_owned();
        self.write(&entry)?;
        *guard = Some(entry);
        debug!("persisted rotated refresh token");
        Ok(())
    }

    /// Listener persisting every rotated refresh token into this store.
    ///
    /// The file is written synchronously inside the notification, so a
    /// rotated token is on disk before the client sends its next request.
    /// The entry is a few hundred bytes and is rewritten at most once per
    /// token refresh.
    #[must_use]
    pub fn token_listener(self: &Arc<Self>) -> TokenListener {
        let store = Arc::clone(self);
        TokenListener::new(move |token| {
            if let Err(err) = store.update_token(token) {
                error!(error = %err, "failed to persist refresh token");
            }
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<ConfigEntry>>, StoreError> {
        self.entry.lock().map_err(|_poisoned| StoreError::Poisoned)
    }

    fn write(&self, entry: &ConfigEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entry)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
