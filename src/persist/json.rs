//! # Flat-JSON persistence on local disk.
//!
//! [`JsonStore`] keeps two files under one directory:
//!
//! - `queue.json` — the [`QueueSnapshot`]
//! - `settings.json` — the [`StreamSettings`] record
//!
//! Each save serializes to `<name>.json.tmp` in the same directory and then
//! renames over the target, so readers only ever observe a complete file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StreamSettings;
use crate::error::PersistError;
use crate::persist::{Persistence, QueueSnapshot};

const QUEUE_FILE: &str = "queue.json";
const SETTINGS_FILE: &str = "settings.json";

/// JSON-file persistence rooted at a directory.
#[derive(Clone, Debug)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Creates a store rooted at `dir`. The directory is created on first
    /// save, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_err(path: &Path, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    async fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), PersistError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_err(&self.dir, e))?;

        let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistError::Corrupt {
            path: path.clone(),
            source: e,
        })?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Self::io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::io_err(&path, e))?;
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PersistError> {
        let path = self.dir.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_err(&path, e)),
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| PersistError::Corrupt {
            path: path.clone(),
            source: e,
        })?;
        Ok(Some(value))
    }
}

#[async_trait]
impl Persistence for JsonStore {
    async fn save_queue(&self, snapshot: &QueueSnapshot) -> Result<(), PersistError> {
        self.save(QUEUE_FILE, snapshot).await
    }

    async fn load_queue(&self) -> Result<Option<QueueSnapshot>, PersistError> {
        self.load(QUEUE_FILE).await
    }

    async fn save_settings(&self, settings: &StreamSettings) -> Result<(), PersistError> {
        self.save(SETTINGS_FILE, settings).await
    }

    async fn load_settings(&self) -> Result<Option<StreamSettings>, PersistError> {
        self.load(SETTINGS_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AssetEntry;

    #[tokio::test]
    async fn test_missing_files_load_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());
        assert!(store.load_queue().await.expect("load").is_none());
        assert!(store.load_settings().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_queue_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());

        let entries = vec![AssetEntry::queued("a.mp4", Some(12.5)), AssetEntry::queued("b.mp4", None)];
        let snapshot = QueueSnapshot::of(&entries);
        store.save_queue(&snapshot).await.expect("save");

        let loaded = store.load_queue().await.expect("load").expect("some");
        assert_eq!(loaded.entries, entries);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());

        let settings = StreamSettings {
            stream_key: "k".into(),
            ..StreamSettings::default()
        };
        store.save_settings(&settings).await.expect("save");
        let loaded = store.load_settings().await.expect("load").expect("some");
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error_not_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("queue.json"), b"{not json").expect("write");

        let store = JsonStore::new(dir.path());
        let err = store.load_queue().await.expect_err("must fail");
        assert_eq!(err.as_label(), "persist_corrupt");
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(dir.path());
        store
            .save_settings(&StreamSettings::default())
            .await
            .expect("save");
        assert!(!dir.path().join("settings.json.tmp").exists());
    }
}
