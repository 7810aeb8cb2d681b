//! Read-only media catalog
//!
//! An external structured document (JSON) mapping file locations to basic
//! track properties. Consumed only as a duration/bitrate oracle so the sync
//! pass doesn't have to re-probe every file.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// One raw catalog entry as stored in the document
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// `file://` URL of the track, possibly percent-encoded
    pub location: String,

    pub artist: Option<String>,

    #[serde(default)]
    pub album_artist: Option<String>,

    pub album: Option<String>,

    pub title: Option<String>,

    /// Playable duration in seconds
    pub duration: f64,

    /// Audio bitrate in kbps, when the player recorded one
    #[serde(default)]
    pub bitrate: Option<u32>,
}

/// Resolved catalog information for one source file
#[derive(Debug, Clone)]
pub struct CatalogInfo {
    /// Path relative to the source root
    pub rel_path: String,

    /// File size at load time
    pub size: u64,

    pub duration_seconds: f64,

    pub bitrate_kbps: Option<u32>,
}

/// The loaded catalog, keyed by absolute source path
#[derive(Debug, Default)]
pub struct MediaCatalog {
    entries: HashMap<PathBuf, CatalogInfo>,
}

impl MediaCatalog {
    /// Load a catalog document, keeping only entries that point at existing
    /// regular files under the source root.
    ///
    /// A non-`file://` location is a configuration error and aborts the run;
    /// a vanished file is not.
    pub fn load(path: &Path, source_root: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let raw: Vec<CatalogEntry> =
            serde_json::from_str(&data).map_err(|e| SyncError::Catalog(e.to_string()))?;

        let mut entries = HashMap::new();
        for entry in raw {
            if entry.location.ends_with(".part") {
                continue;
            }
            let url = Url::parse(&entry.location).map_err(|e| {
                SyncError::Catalog(format!("bad location {}: {e}", entry.location))
            })?;
            if url.scheme() != "file" {
                return Err(SyncError::Catalog(format!(
                    "not a file:// URL: {}",
                    entry.location
                )));
            }
            let file_path = url.to_file_path().map_err(|()| {
                SyncError::Catalog(format!("unusable file URL: {}", entry.location))
            })?;

            let metadata = match fs::metadata(&file_path) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            let rel_path = match file_path.strip_prefix(source_root) {
                Ok(rel) => rel.to_string_lossy().into_owned(),
                Err(_) => continue,
            };

            entries.insert(
                file_path,
                CatalogInfo {
                    rel_path,
                    size: metadata.len(),
                    duration_seconds: entry.duration,
                    bitrate_kbps: entry.bitrate,
                },
            );
        }

        tracing::debug!("catalog loaded: {} usable entries", entries.len());
        Ok(Self { entries })
    }

    /// Look up a source file by absolute path
    pub fn get(&self, path: &Path) -> Option<&CatalogInfo> {
        self.entries.get(path)
    }

    /// Iterate all usable entries
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &CatalogInfo)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog_json(entries: &[(String, f64, Option<u32>)]) -> String {
        let items: Vec<String> = entries
            .iter()
            .map(|(loc, dur, bitrate)| {
                let bitrate = bitrate
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "null".to_string());
                format!(
                    r#"{{"location":"{loc}","artist":"A","album":"B","title":"T","duration":{dur},"bitrate":{bitrate}}}"#
                )
            })
            .collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn test_load_filters_missing_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let song = root.join("song.mp3");
        fs::write(&song, b"x").unwrap();

        let json = catalog_json(&[
            (format!("file://{}", song.display()), 180.0, Some(320)),
            (format!("file://{}/gone.mp3", root.display()), 10.0, None),
        ]);
        let catalog_path = root.join("catalog.json");
        fs::write(&catalog_path, json).unwrap();

        let catalog = MediaCatalog::load(&catalog_path, root).unwrap();
        assert_eq!(catalog.len(), 1);
        let info = catalog.get(&song).unwrap();
        assert_eq!(info.rel_path, "song.mp3");
        assert_eq!(info.bitrate_kbps, Some(320));
    }

    #[test]
    fn test_non_file_url_is_fatal() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let json = catalog_json(&[("http://example.com/a.mp3".to_string(), 1.0, None)]);
        let catalog_path = root.join("catalog.json");
        fs::write(&catalog_path, json).unwrap();

        let result = MediaCatalog::load(&catalog_path, root);
        assert!(matches!(result, Err(SyncError::Catalog(_))));
    }

    #[test]
    fn test_entries_outside_root_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("music");
        fs::create_dir(&root).unwrap();
        let outside = temp.path().join("other.mp3");
        fs::write(&outside, b"x").unwrap();

        let json = catalog_json(&[(format!("file://{}", outside.display()), 5.0, None)]);
        let catalog_path = temp.path().join("catalog.json");
        fs::write(&catalog_path, json).unwrap();

        let catalog = MediaCatalog::load(&catalog_path, &root).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_percent_encoded_locations_resolve() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let song = root.join("His Band/a b.mp3");
        fs::create_dir_all(song.parent().unwrap()).unwrap();
        fs::write(&song, b"x").unwrap();

        let json = catalog_json(&[(
            format!("file://{}/His%20Band/a%20b.mp3", root.display()),
            240.0,
            Some(320),
        )]);
        let catalog_path = root.join("catalog.json");
        fs::write(&catalog_path, json).unwrap();

        let catalog = MediaCatalog::load(&catalog_path, root).unwrap();
        let info = catalog.get(&song).unwrap();
        assert_eq!(info.rel_path, "His Band/a b.mp3");
        assert_eq!(info.bitrate_kbps, Some(320));
    }

    #[test]
    fn test_part_locations_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let json = catalog_json(&[(format!("file://{}/a.mp3.part", root.display()), 5.0, None)]);
        let catalog_path = root.join("catalog.json");
        fs::write(&catalog_path, json).unwrap();

        let catalog = MediaCatalog::load(&catalog_path, root).unwrap();
        assert!(catalog.is_empty());
    }
}
