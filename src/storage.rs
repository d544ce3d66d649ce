//! Durable storage for the license state record.
//!
//! The state is a small JSON document at a fixed local path, by default
//! `<data dir>/chronolock/license_data.json`:
//!
//! - Windows: `%APPDATA%\chronolock\license_data.json`
//! - macOS: `~/Library/Application Support/chronolock/license_data.json`
//! - Linux: `~/.local/share/chronolock/license_data.json`
//!
//! The record stays forward-readable: optional fields are omitted when
//! absent and default on read, so adding fields never breaks older readers.
//!
//! Saves go through a temp sibling followed by a rename, so a concurrent
//! load observes either the old record or the new one, never a partial
//! write. Deleting the file is the supported way to re-enter trial.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::get_config;
use crate::errors::{LicenseError, LicenseResult, StoreError};

/// File name of the license state record.
const LICENSE_FILE: &str = "license_data.json";

/// The persisted license facts. Status is always derived from these plus the
/// current time, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseState {
    /// Date the trial began. Set once, on first run, never updated.
    pub trial_start: DateTime<Utc>,

    /// True once a valid key has been accepted.
    #[serde(default)]
    pub is_activated: bool,

    /// Machine identifier the license is bound to. Present iff activated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_machine_id: Option<String>,

    /// The key string that was last successfully validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_key: Option<String>,
}

impl LicenseState {
    /// Fresh first-run state: trial starts now, nothing activated.
    pub fn new_trial(trial_start: DateTime<Utc>) -> Self {
        Self {
            trial_start,
            is_activated: false,
            bound_machine_id: None,
            activated_key: None,
        }
    }

    /// The state after a successful activation, bound to `machine_id`.
    /// `trial_start` is carried over unchanged.
    pub fn activated(mut self, machine_id: String, key: String) -> Self {
        self.is_activated = true;
        self.bound_machine_id = Some(machine_id);
        self.activated_key = Some(key);
        self
    }
}

/// Load/save of the license state record.
#[derive(Debug, Clone)]
pub struct LicenseStateStore {
    path: PathBuf,
}

impl LicenseStateStore {
    /// Store backed by an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the configured path, or the platform default when the
    /// configuration leaves it empty.
    pub fn from_config() -> LicenseResult<Self> {
        let config = get_config()?;
        if !config.storage.file_path.is_empty() {
            return Ok(Self::new(&config.storage.file_path));
        }

        let path = default_license_path().ok_or_else(|| {
            LicenseError::Config("could not determine app data directory".to_string())
        })?;
        Ok(Self::new(path))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state.
    ///
    /// Returns `Ok(None)` when no record exists yet (first run). A record
    /// that exists but cannot be parsed is `StoreError::Corrupt`, which is
    /// not a first run and must never be silently replaced.
    pub fn load(&self) -> Result<Option<LicenseState>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let state = serde_json::from_str(&contents).map_err(StoreError::Corrupt)?;
        Ok(Some(state))
    }

    /// Write the full state atomically.
    ///
    /// The record is written to a temp sibling and renamed into place, so a
    /// concurrent load never observes a half-written file.
    pub fn save(&self, state: &LicenseState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        log::debug!("saved license state to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored record. Absent file is not an error.
    pub fn wipe(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("wiped license state at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Platform-default path of the license state file.
pub fn default_license_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("chronolock").join(LICENSE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> LicenseStateStore {
        LicenseStateStore::new(dir.path().join(LICENSE_FILE))
    }

    #[test]
    fn missing_file_is_first_run() {
        let dir = tempdir().expect("tempdir");
        let store = test_store(&dir);

        let loaded = store.load().expect("load should succeed");
        assert!(loaded.is_none());
    }

    #[test]
    fn round_trip_preserves_state() {
        let dir = tempdir().expect("tempdir");
        let store = test_store(&dir);

        let state = LicenseState::new_trial(Utc::now())
            .activated("machine-1".to_string(), "DEMO-123-456-789".to_string());
        store.save(&state).expect("save should succeed");

        let loaded = store
            .load()
            .expect("load should succeed")
            .expect("record should exist");
        assert_eq!(loaded, state);
    }

    #[test]
    fn corrupt_record_is_not_first_run() {
        let dir = tempdir().expect("tempdir");
        let store = test_store(&dir);

        fs::write(store.path(), "{ not json").expect("write should succeed");

        let result = store.load();
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempdir().expect("tempdir");
        let store = LicenseStateStore::new(dir.path().join("nested").join(LICENSE_FILE));

        let state = LicenseState::new_trial(Utc::now());
        store.save(&state).expect("save should succeed");

        assert!(store.path().exists());
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempdir().expect("tempdir");
        let store = test_store(&dir);

        store
            .save(&LicenseState::new_trial(Utc::now()))
            .expect("save should succeed");

        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn wipe_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = test_store(&dir);

        store.wipe().expect("wipe on missing file should succeed");

        store
            .save(&LicenseState::new_trial(Utc::now()))
            .expect("save should succeed");
        store.wipe().expect("wipe should succeed");
        assert!(!store.path().exists());

        store.wipe().expect("second wipe should succeed");
    }

    #[test]
    fn record_with_unknown_fields_still_parses() {
        let dir = tempdir().expect("tempdir");
        let store = test_store(&dir);

        let json = format!(
            r#"{{"trial_start":"{}","is_activated":false,"some_future_field":42}}"#,
            Utc::now().to_rfc3339()
        );
        fs::write(store.path(), json).expect("write should succeed");

        let loaded = store.load().expect("load should succeed");
        assert!(loaded.is_some());
    }

    #[test]
    fn absent_optional_fields_mean_not_activated() {
        let dir = tempdir().expect("tempdir");
        let store = test_store(&dir);

        let json = format!(r#"{{"trial_start":"{}"}}"#, Utc::now().to_rfc3339());
        fs::write(store.path(), json).expect("write should succeed");

        let loaded = store
            .load()
            .expect("load should succeed")
            .expect("record should exist");
        assert!(!loaded.is_activated);
        assert!(loaded.bound_machine_id.is_none());
        assert!(loaded.activated_key.is_none());
    }

    #[test]
    fn fresh_trial_omits_optional_fields() {
        let state = LicenseState::new_trial(Utc::now());
        let json = serde_json::to_string(&state).expect("serialize should succeed");

        assert!(!json.contains("bound_machine_id"));
        assert!(!json.contains("activated_key"));
    }
}
