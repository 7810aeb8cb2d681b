//! Deterministic source tree scanning

use crate::catalog::MediaCatalog;
use crate::error::{Result, SyncError};
use portatune_core::{
    classify, FileKind, FileRecord, ALWAYS_EXCLUDED_DIRS, IGNORE_FILE_NAME,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Statistics from a tree scan
#[derive(Debug, Default, Clone)]
pub struct ScanStats {
    /// Files registered in the seen index (music and covers)
    pub files_indexed: usize,

    /// Cover art files among them
    pub covers: usize,

    /// Second files mapping to an already-registered track path
    pub duplicate_tracks: usize,

    /// Directories claimed under an already-bound relative path
    pub duplicate_dirs: usize,

    /// Ignore-file entries matching neither a file nor a subdirectory
    pub unmatched_ignores: usize,

    /// Files removed by exclusion prefixes
    pub excluded: usize,
}

/// Canonical index of one scanned tree.
///
/// `seen` maps each track path (relative path, extension stripped) to its
/// source file; keys are unique, first registration wins. `music_dirs` maps
/// each relative directory to the single absolute directory that owns it.
#[derive(Debug, Default)]
pub struct ScanIndex {
    pub seen: BTreeMap<String, FileRecord>,
    pub music_dirs: BTreeMap<String, PathBuf>,
    pub stats: ScanStats,
}

/// Walks a directory tree in lexicographic order, applying ignore rules and
/// classifying files, so conflict reporting and job ordering are reproducible
/// across runs.
pub struct TreeScanner<'a> {
    root: PathBuf,
    exclude: Vec<PathBuf>,
    catalog: Option<&'a MediaCatalog>,
}

impl<'a> TreeScanner<'a> {
    /// Create a scanner for a root with a set of excluded path prefixes
    pub fn new(root: impl Into<PathBuf>, exclude: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude,
            catalog: None,
        }
    }

    /// Attach a catalog so scanned records carry known durations and
    /// bitrates
    pub fn with_catalog(mut self, catalog: &'a MediaCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Scan the tree, producing the seen index and music directory index
    pub fn scan(&self) -> Result<ScanIndex> {
        if !self.root.exists() {
            return Err(SyncError::FileNotFound(self.root.display().to_string()));
        }
        if !self.root.is_dir() {
            return Err(SyncError::InvalidPath(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut index = ScanIndex::default();
        self.scan_dir(&self.root, &mut index)?;
        Ok(index)
    }

    fn scan_dir(&self, dir: &Path, index: &mut ScanIndex) -> Result<()> {
        let mut subdirs: Vec<PathBuf> = Vec::new();
        let mut files: Vec<PathBuf> = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                subdirs.push(path);
            } else {
                files.push(path);
            }
        }
        subdirs.sort();
        files.sort();

        let ignore_file = dir.join(IGNORE_FILE_NAME);
        if ignore_file.is_file() {
            self.apply_ignore_file(&ignore_file, &mut subdirs, &mut files, index)?;
        }
        subdirs.retain(|d| {
            d.file_name()
                .and_then(|n| n.to_str())
                .map(|n| !ALWAYS_EXCLUDED_DIRS.contains(&n))
                .unwrap_or(true)
        });

        for file in &files {
            self.process_file(file, index);
        }
        for subdir in &subdirs {
            self.scan_dir(subdir, index)?;
        }

        Ok(())
    }

    /// Remove names listed in a per-directory ignore file from this
    /// directory's traversal. Unmatched entries are reported but non-fatal.
    fn apply_ignore_file(
        &self,
        ignore_file: &Path,
        subdirs: &mut Vec<PathBuf>,
        files: &mut Vec<PathBuf>,
        index: &mut ScanIndex,
    ) -> Result<()> {
        let contents = fs::read_to_string(ignore_file)?;
        for name in contents.lines() {
            let name = name.trim_end_matches('\r');
            if name.is_empty() {
                continue;
            }
            let dir_pos = subdirs
                .iter()
                .position(|d| d.file_name().and_then(|n| n.to_str()) == Some(name));
            if let Some(pos) = dir_pos {
                subdirs.remove(pos);
                continue;
            }
            let file_pos = files
                .iter()
                .position(|f| f.file_name().and_then(|n| n.to_str()) == Some(name));
            if let Some(pos) = file_pos {
                files.remove(pos);
                continue;
            }
            tracing::warn!(
                "ignored filename not found: {} (in {})",
                name,
                ignore_file.display()
            );
            index.stats.unmatched_ignores += 1;
        }
        Ok(())
    }

    fn process_file(&self, path: &Path, index: &mut ScanIndex) {
        if self.exclude.iter().any(|prefix| path.starts_with(prefix)) {
            index.stats.excluded += 1;
            return;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => {
                tracing::warn!("skipping non-UTF-8 filename: {}", path.display());
                return;
            }
        };
        // unison leaves temporary files behind mid-transfer
        if filename.starts_with(".unison.") {
            return;
        }

        let kind = classify(path);
        if !matches!(kind, FileKind::Lossless | FileKind::Lossy | FileKind::Cover) {
            return;
        }

        let rel = match path.strip_prefix(&self.root).ok().and_then(Path::to_str) {
            Some(rel) => rel,
            None => {
                tracing::warn!("skipping unrepresentable path: {}", path.display());
                return;
            }
        };
        let rel_dir = Path::new(rel)
            .parent()
            .and_then(Path::to_str)
            .unwrap_or("")
            .to_string();
        let stem = match Path::new(rel).file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => return,
        };
        let track_path = if rel_dir.is_empty() {
            stem.to_string()
        } else {
            format!("{rel_dir}/{stem}")
        };

        let metadata = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("failed to stat {}: {}", path.display(), e);
                return;
            }
        };
        let mtime = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);

        if let Some(existing) = index.seen.get(&track_path) {
            tracing::warn!(
                "duplicate track path {track_path}: keeping {}, skipping {}",
                existing.path.display(),
                path.display()
            );
            index.stats.duplicate_tracks += 1;
            return;
        }

        let extension = portatune_core::extension_of(path).unwrap_or_default();
        let catalog_info = self.catalog.and_then(|c| c.get(path));
        let record = FileRecord {
            track_path: track_path.clone(),
            extension,
            path: path.to_path_buf(),
            mtime,
            size: metadata.len(),
            duration_seconds: catalog_info.map(|info| info.duration_seconds),
            bitrate_kbps: catalog_info.and_then(|info| info.bitrate_kbps),
        };
        index.seen.insert(track_path, record);
        index.stats.files_indexed += 1;
        if kind == FileKind::Cover {
            index.stats.covers += 1;
        }

        // Only real music claims directory ownership; covers alone don't
        // make a directory worth mirroring.
        if matches!(kind, FileKind::Lossless | FileKind::Lossy) {
            if let Some(abs_dir) = path.parent() {
                match index.music_dirs.get(&rel_dir) {
                    Some(owner) if owner != abs_dir => {
                        tracing::warn!(
                            "duplicate directory {rel_dir}: owned by {}, also claimed by {}",
                            owner.display(),
                            abs_dir.display()
                        );
                        index.stats.duplicate_dirs += 1;
                    }
                    Some(_) => {}
                    None => {
                        index
                            .music_dirs
                            .insert(rel_dir.clone(), abs_dir.to_path_buf());
                    }
                }
            }
        }
    }
}
