//! Two-phase removal of stale destination files
//!
//! Phase one walks the destination and collects everything the current scan
//! no longer accounts for; the caller may show the list and ask for
//! confirmation before phase two deletes the files and sweeps out empty
//! directories. Synchronization state (`.sync`, `.stignore`) is never
//! touched.

use crate::error::Result;
use crate::scanner::ScanIndex;
use portatune_core::SyncConfig;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Statistics from one prune pass
#[derive(Debug, Default, Clone)]
pub struct PruneStats {
    /// Files actually removed
    pub removed: usize,

    /// Files already gone when removal was attempted
    pub gone: usize,

    /// Empty directories swept out afterwards
    pub empty_dirs_removed: usize,
}

/// Finds and removes destination files with no surviving source counterpart.
pub struct StaleFilePruner<'a> {
    config: &'a SyncConfig,
    index: &'a ScanIndex,
}

impl<'a> StaleFilePruner<'a> {
    pub fn new(config: &'a SyncConfig, index: &'a ScanIndex) -> Self {
        Self { config, index }
    }

    /// Collect destination files that no longer correspond to any seen
    /// source file, in sorted order.
    pub fn find_obsolete(&self) -> Result<Vec<PathBuf>> {
        let lossy_ext = self.config.lossy_ext();
        let transcoded_mp3_suffix = format!(".mp3{lossy_ext}");
        let mut obsolete = Vec::new();

        for entry in WalkDir::new(&self.config.dest).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel = match path.strip_prefix(&self.config.dest).ok().and_then(Path::to_str) {
                Some(rel) => rel,
                None => continue,
            };
            if rel == ".stignore" || rel.starts_with(".sync/") {
                continue;
            }

            let (mut track_path, extension) = split_extension(rel);
            if rel.to_lowercase().ends_with(&transcoded_mp3_suffix) {
                // song.mp3.m4a maps back to the track of song.mp3
                track_path = split_extension(&track_path).0;
            } else if extension.eq_ignore_ascii_case("mp3") {
                let transcoded = crate::reconcile::append_extension(path, lossy_ext);
                if transcoded.is_file() {
                    // the original was kept alongside its transcode
                    obsolete.push(path.to_path_buf());
                    continue;
                }
            }

            let rel_dir = Path::new(rel).parent().and_then(Path::to_str).unwrap_or("");
            if !self.index.seen.contains_key(&track_path)
                || !self.index.music_dirs.contains_key(rel_dir)
            {
                obsolete.push(path.to_path_buf());
            }
        }

        Ok(obsolete)
    }

    /// Remove a previously collected file list. Files that vanished in the
    /// meantime are counted, not errors.
    pub fn remove_files(&self, files: &[PathBuf]) -> Result<PruneStats> {
        let mut stats = PruneStats::default();
        for path in files {
            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!("removed: {}", path.display());
                    stats.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::info!("gone: {}", path.display());
                    stats.gone += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stats)
    }

    /// Remove now-empty directories bottom-up, leaving `.sync` alone.
    pub fn remove_empty_dirs(&self, stats: &mut PruneStats) -> Result<()> {
        for entry in WalkDir::new(&self.config.dest)
            .contents_first(true)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_dir() || path == self.config.dest {
                continue;
            }
            if path
                .components()
                .any(|c| c.as_os_str() == std::ffi::OsStr::new(".sync"))
            {
                continue;
            }
            if fs::read_dir(path)?.next().is_none() {
                fs::remove_dir(path)?;
                tracing::info!("removed empty dir: {}", path.display());
                stats.empty_dirs_removed += 1;
            }
        }
        Ok(())
    }
}

/// Split `Album/01.mp3` into (`Album/01`, `mp3`).
fn split_extension(rel: &str) -> (String, String) {
    match rel.rfind('.') {
        Some(pos) if pos > rel.rfind('/').map_or(0, |p| p + 1) => {
            (rel[..pos].to_string(), rel[pos + 1..].to_string())
        }
        _ => (rel.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::TreeScanner;
    use portatune_core::TargetCodec;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn setup(temp: &TempDir) -> SyncConfig {
        let source = temp.path().join("source");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        let mut config = SyncConfig::new(source, dest);
        config.codec = TargetCodec::Aac;
        config
    }

    fn index(config: &SyncConfig) -> ScanIndex {
        TreeScanner::new(&config.source, Vec::new()).scan().unwrap()
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(
            split_extension("Album/01.mp3"),
            ("Album/01".to_string(), "mp3".to_string())
        );
        assert_eq!(
            split_extension("Album/.hidden"),
            ("Album/.hidden".to_string(), String::new())
        );
        assert_eq!(
            split_extension("noext"),
            ("noext".to_string(), String::new())
        );
    }

    #[test]
    fn test_orphaned_files_are_found() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.source.join("Album/keep.mp3"));
        touch(&config.dest.join("Album/keep.mp3"));
        touch(&config.dest.join("Album/orphan.mp3"));
        touch(&config.dest.join("Gone/old.mp3"));

        let scan = index(&config);
        let pruner = StaleFilePruner::new(&config, &scan);
        let obsolete = pruner.find_obsolete().unwrap();

        assert_eq!(
            obsolete,
            vec![
                config.dest.join("Album/orphan.mp3"),
                config.dest.join("Gone/old.mp3"),
            ]
        );
    }

    #[test]
    fn test_transcoded_forms_survive() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.source.join("Album/song.flac"));
        touch(&config.source.join("Album/loud.mp3"));
        touch(&config.dest.join("Album/song.m4a"));
        touch(&config.dest.join("Album/loud.mp3.m4a"));

        let scan = index(&config);
        let pruner = StaleFilePruner::new(&config, &scan);
        assert!(pruner.find_obsolete().unwrap().is_empty());
    }

    #[test]
    fn test_original_next_to_transcode_is_obsolete() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.source.join("Album/loud.mp3"));
        touch(&config.dest.join("Album/loud.mp3"));
        touch(&config.dest.join("Album/loud.mp3.m4a"));

        let scan = index(&config);
        let pruner = StaleFilePruner::new(&config, &scan);
        let obsolete = pruner.find_obsolete().unwrap();
        assert_eq!(obsolete, vec![config.dest.join("Album/loud.mp3")]);
    }

    #[test]
    fn test_sync_state_is_exempt() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.dest.join(".sync/state.db"));
        touch(&config.dest.join(".stignore"));

        let scan = index(&config);
        let pruner = StaleFilePruner::new(&config, &scan);
        assert!(pruner.find_obsolete().unwrap().is_empty());

        let mut stats = PruneStats::default();
        pruner.remove_empty_dirs(&mut stats).unwrap();
        assert!(config.dest.join(".sync").is_dir());
    }

    #[test]
    fn test_remove_tolerates_vanished_files() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let present = config.dest.join("Album/orphan.mp3");
        touch(&present);

        let scan = index(&config);
        let pruner = StaleFilePruner::new(&config, &scan);
        let stats = pruner
            .remove_files(&[present.clone(), config.dest.join("Album/vanished.mp3")])
            .unwrap();

        assert_eq!(stats.removed, 1);
        assert_eq!(stats.gone, 1);
        assert!(!present.exists());
    }

    #[test]
    fn test_empty_dirs_removed_bottom_up() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        fs::create_dir_all(config.dest.join("A/B/C")).unwrap();
        touch(&config.dest.join("Keep/.placeholder"));

        let scan = index(&config);
        let pruner = StaleFilePruner::new(&config, &scan);
        let mut stats = PruneStats::default();
        pruner.remove_empty_dirs(&mut stats).unwrap();

        assert_eq!(stats.empty_dirs_removed, 3);
        assert!(!config.dest.join("A").exists());
        assert!(config.dest.join("Keep").is_dir());
    }
}
