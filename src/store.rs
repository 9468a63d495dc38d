//! Local persistence: the save-for-later queue and per-session state.
//!
//! Both files live under the configured data directory and are written
//! with a temp-then-rename so a crash never leaves a half-written file.

use crate::error::{Error, Result};
use crate::snapshot::DesignSnapshot;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Most recent designs the save-for-later queue keeps.
pub const MAX_SAVED_DESIGNS: usize = 5;

const SAVED_FILE: &str = "saved_designs.json";
const SESSION_FILE: &str = "last_design.json";

/// One design parked for later checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDesignEntry {
    pub tracking_code: String,
    pub created_at: DateTime<Utc>,
    pub design_data: DesignSnapshot,
}

/// What the most recent capture produced, for later order association.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub tracking_code: Option<String>,
    pub design_id: Option<String>,
}

/// File-backed state store rooted at one data directory.
pub struct StateStore {
    base_dir: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .map_err(|e| Error::StorageError(format!("{}: {}", base_dir.display(), e)))?;
        debug!("State store at {}", base_dir.display());
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn saved_path(&self) -> PathBuf {
        self.base_dir.join(SAVED_FILE)
    }

    fn session_path(&self) -> PathBuf {
        self.base_dir.join(SESSION_FILE)
    }

    /// Current queue contents, oldest first. A corrupt file is treated as
    /// empty rather than wedging every future save.
    pub fn saved_designs(&self) -> Result<Vec<SavedDesignEntry>> {
        self.read_json_or(&self.saved_path(), Vec::new)
    }

    /// Append `entry` and evict oldest entries beyond [`MAX_SAVED_DESIGNS`].
    /// Returns the queue as persisted.
    pub fn save_for_later(&self, entry: SavedDesignEntry) -> Result<Vec<SavedDesignEntry>> {
        let mut entries = self.saved_designs()?;
        entries.push(entry);

        let overflow = entries.len().saturating_sub(MAX_SAVED_DESIGNS);
        if overflow > 0 {
            let evicted: Vec<String> = entries
                .drain(..overflow)
                .map(|e| e.tracking_code)
                .collect();
            info!("Save queue full; evicted {}", evicted.join(", "));
        }

        self.write_json(&self.saved_path(), &entries)?;
        Ok(entries)
    }

    /// Drop every queued design.
    pub fn clear_saved(&self) -> Result<()> {
        let path = self.saved_path();
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::StorageError(format!("{}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    pub fn record_session(&self, record: &SessionRecord) -> Result<()> {
        self.write_json(&self.session_path(), record)
    }

    pub fn last_design(&self) -> Result<SessionRecord> {
        self.read_json_or(&self.session_path(), SessionRecord::default)
    }

    fn read_json_or<T, F>(&self, path: &Path, empty: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        if !path.exists() {
            return Ok(empty());
        }
        let body = fs::read_to_string(path)
            .map_err(|e| Error::StorageError(format!("{}: {}", path.display(), e)))?;
        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Discarding corrupt state file {}: {}", path.display(), e);
                Ok(empty())
            }
        }
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| Error::StorageError(format!("{}: {}", path.display(), e)))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .map_err(|e| Error::StorageError(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| Error::StorageError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::DesignConfig;
    use std::collections::BTreeMap;

    fn entry(code: &str) -> SavedDesignEntry {
        let mut pieces = BTreeMap::new();
        pieces.insert("Red".to_string(), 4);
        SavedDesignEntry {
            tracking_code: code.to_string(),
            created_at: Utc::now(),
            design_data: DesignSnapshot::new("vb_test", pieces, DesignConfig::default()),
        }
    }

    #[test]
    fn test_queue_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        assert!(store.saved_designs().unwrap().is_empty());
    }

    #[test]
    fn test_queue_evicts_oldest_beyond_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        for i in 0..7 {
            store.save_for_later(entry(&format!("VB-20260823-{:06}", i))).unwrap();
        }

        let entries = store.saved_designs().unwrap();
        assert_eq!(entries.len(), MAX_SAVED_DESIGNS);
        let codes: Vec<&str> = entries.iter().map(|e| e.tracking_code.as_str()).collect();
        assert_eq!(
            codes,
            vec![
                "VB-20260823-000002",
                "VB-20260823-000003",
                "VB-20260823-000004",
                "VB-20260823-000005",
                "VB-20260823-000006",
            ]
        );
    }

    #[test]
    fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::new(dir.path()).unwrap();
            store.save_for_later(entry("VB-20260823-AAAAAA")).unwrap();
        }
        let store = StateStore::new(dir.path()).unwrap();
        let entries = store.saved_designs().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tracking_code, "VB-20260823-AAAAAA");
        assert_eq!(entries[0].design_data.total_pieces, 4);
    }

    #[test]
    fn test_corrupt_queue_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        fs::write(dir.path().join(SAVED_FILE), "{not json").unwrap();
        assert!(store.saved_designs().unwrap().is_empty());

        // Saving still works afterwards.
        store.save_for_later(entry("VB-20260823-BBBBBB")).unwrap();
        assert_eq!(store.saved_designs().unwrap().len(), 1);
    }

    #[test]
    fn test_session_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();

        assert_eq!(store.last_design().unwrap(), SessionRecord::default());

        let record = SessionRecord {
            tracking_code: Some("VB-20260823-CCCCCC".to_string()),
            design_id: Some("design-9".to_string()),
        };
        store.record_session(&record).unwrap();
        assert_eq!(store.last_design().unwrap(), record);
    }

    #[test]
    fn test_clear_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        store.save_for_later(entry("VB-20260823-DDDDDD")).unwrap();
        store.clear_saved().unwrap();
        assert!(store.saved_designs().unwrap().is_empty());
        store.clear_saved().unwrap();
    }
}
