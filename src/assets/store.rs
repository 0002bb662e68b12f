//! # Asset resolution.
//!
//! [`AssetStore`] is the seam between the orchestrator and wherever media
//! files actually live. [`DirStore`] is the production implementation: a
//! flat directory of video files where the file name is the asset id.
//! [`MemoryStore`] backs tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AssetError;

/// File extensions accepted as broadcastable video.
const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov"];

/// A resolved, openable media asset.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedAsset {
    /// Asset id the resolution was requested for.
    pub id: String,
    /// Path to the media file.
    pub path: PathBuf,
    /// Media duration, when known.
    pub duration: Option<Duration>,
    /// File size in bytes.
    pub size: u64,
}

/// Listing metadata for an available asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetMeta {
    /// Asset id (file name for directory-backed stores).
    pub id: String,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

/// Maps asset ids to playable media.
#[async_trait]
pub trait AssetStore: Send + Sync + 'static {
    /// Resolves an id to an openable media file.
    async fn resolve(&self, id: &str) -> Result<ResolvedAsset, AssetError>;
}

/// Directory-backed asset store: one flat directory, file name = asset id.
#[derive(Clone, Debug)]
pub struct DirStore {
    root: PathBuf,
    probe_bin: Option<String>,
}

impl DirStore {
    /// Creates a store over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            probe_bin: None,
        }
    }

    /// Enables media-duration probing through the given `ffprobe` binary.
    ///
    /// Probing failures degrade to `duration = None`; duration is optional
    /// metadata, not a resolution requirement.
    #[must_use]
    pub fn with_probe(mut self, probe_bin: impl Into<String>) -> Self {
        self.probe_bin = Some(probe_bin.into());
        self
    }

    /// Directory the store reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the file name carries an accepted video extension.
    pub fn is_video(id: &str) -> bool {
        Path::new(id)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Lists available assets, newest first.
    pub async fn list(&self) -> std::io::Result<Vec<AssetMeta>> {
        let mut out = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name.to_str() else { continue };
            if !Self::is_video(id) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(AssetMeta {
                id: id.to_string(),
                size: meta.len(),
                modified,
            });
        }

        out.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(out)
    }

    async fn probe_duration(&self, path: &Path) -> Option<Duration> {
        let bin = self.probe_bin.as_deref()?;
        let output = tokio::process::Command::new(bin)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("csv=p=0")
            .arg(path)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let secs: f64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
        (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
    }
}

#[async_trait]
impl AssetStore for DirStore {
    async fn resolve(&self, id: &str) -> Result<ResolvedAsset, AssetError> {
        // Ids are bare file names; anything path-like is rejected rather
        // than allowed to escape the root.
        if id.is_empty() || id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            return Err(AssetError::NotFound { id: id.to_string() });
        }

        let path = self.root.join(id);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AssetError::NotFound { id: id.to_string() })
            }
            Err(e) => {
                return Err(AssetError::Unreadable {
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        if !meta.is_file() {
            return Err(AssetError::NotFound { id: id.to_string() });
        }

        Ok(ResolvedAsset {
            id: id.to_string(),
            duration: self.probe_duration(&path).await,
            size: meta.len(),
            path,
        })
    }
}

/// In-memory asset store for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    assets: HashMap<String, ResolvedAsset>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset.
    pub fn insert(&mut self, asset: ResolvedAsset) {
        self.assets.insert(asset.id.clone(), asset);
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn resolve(&self, id: &str) -> Result<ResolvedAsset, AssetError> {
        self.assets
            .get(id)
            .cloned()
            .ok_or_else(|| AssetError::NotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_filter() {
        assert!(DirStore::is_video("clip.mp4"));
        assert!(DirStore::is_video("CLIP.MKV"));
        assert!(!DirStore::is_video("notes.txt"));
        assert!(!DirStore::is_video("no_extension"));
    }

    #[tokio::test]
    async fn test_resolve_rejects_path_traversal() {
        let store = DirStore::new("/nonexistent");
        for id in ["../etc/passwd", "a/b.mp4", "", ".."] {
            let err = store.resolve(id).await.expect_err("must reject");
            assert_eq!(err.as_label(), "asset_not_found");
        }
    }

    #[tokio::test]
    async fn test_resolve_and_list_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.mp4"), b"x").expect("write");
        std::fs::write(dir.path().join("skip.txt"), b"x").expect("write");

        let store = DirStore::new(dir.path());
        let asset = store.resolve("a.mp4").await.expect("resolve");
        assert_eq!(asset.size, 1);
        assert!(asset.duration.is_none());

        let listing = store.list().await.expect("list");
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].id, "a.mp4");
    }

    #[tokio::test]
    async fn test_missing_asset_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(dir.path());
        let err = store.resolve("ghost.mp4").await.expect_err("missing");
        assert_eq!(err.as_label(), "asset_not_found");
    }
}
