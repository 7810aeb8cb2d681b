//! Source/destination reconciliation
//!
//! Walks the seen index in sorted order and decides, for every source file,
//! exactly one action: enqueue a transcode, enqueue a retag, hardlink it into
//! place, swap a stale hardlink, or leave it alone.

use crate::catalog::MediaCatalog;
use crate::error::{Result, SyncError};
use crate::scanner::ScanIndex;
use crate::types::{RetagJob, TranscodeJob};
use portatune_core::{is_lossless, system_time_secs, FileRecord, SyncConfig, MTIME_TOLERANCE_SECS};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Bytes per second of playable audio at ~320 kbps, for duration estimates
/// when neither a probe nor the catalog can answer.
const BYTES_PER_SECOND_320K: f64 = 40_000.0;

/// EXDEV: attempted hardlink across filesystem boundaries
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Statistics from one reconciliation pass
#[derive(Debug, Default, Clone)]
pub struct PlanStats {
    /// New files hardlinked into the destination
    pub linked: usize,

    /// Stale destination files replaced with a link to the source
    pub replaced_dest: usize,

    /// Stale source files replaced with a link to the destination
    pub replaced_source: usize,

    /// Entries already in sync
    pub up_to_date: usize,

    /// Entries skipped because their directory holds no recognized music
    pub skipped_no_music_dir: usize,

    /// Source files that vanished between scan and link
    pub missing_sources: usize,
}

/// The output of reconciliation: direct actions already applied, plus the
/// job lists handed to the transcode pipeline.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Metadata-only updates for existing transcoded destinations
    pub retag_jobs: Vec<RetagJob>,

    /// Lossless sources lacking a transcoded destination
    pub lossless_jobs: Vec<TranscodeJob>,

    /// Total source bytes behind `lossless_jobs`
    pub lossless_bytes: u64,

    /// High-bitrate lossy sources lacking a transcoded destination
    pub lossy_jobs: Vec<TranscodeJob>,

    /// Total source bytes behind `lossy_jobs`
    pub lossy_bytes: u64,

    pub stats: PlanStats,
}

/// Decides one action per seen source file, applying link/replace actions
/// directly and collecting transcode/retag jobs for the pipeline.
pub struct ReconciliationEngine<'a> {
    config: &'a SyncConfig,
    index: &'a ScanIndex,
    catalog: Option<&'a MediaCatalog>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        config: &'a SyncConfig,
        index: &'a ScanIndex,
        catalog: Option<&'a MediaCatalog>,
    ) -> Self {
        Self {
            config,
            index,
            catalog,
        }
    }

    /// Run the reconciliation pass.
    ///
    /// Iteration is in track-path order, so actions and job lists are
    /// reproducible across runs. Hardlinks are created as a side effect;
    /// a cross-device link attempt aborts the whole run.
    pub fn reconcile(&self) -> Result<SyncPlan> {
        let mut plan = SyncPlan::default();

        for record in self.index.seen.values() {
            if is_lossless(&record.extension) {
                self.reconcile_lossless(record, &mut plan)?;
            } else {
                self.reconcile_lossy(record, &mut plan)?;
            }
        }

        self.collect_lossy_transcodes(&mut plan);

        plan.lossless_jobs.sort_by(|a, b| a.source.cmp(&b.source));
        plan.lossy_jobs.sort_by(|a, b| a.source.cmp(&b.source));

        Ok(plan)
    }

    /// Lossless sources are mirrored only in transcoded form.
    fn reconcile_lossless(&self, record: &FileRecord, plan: &mut SyncPlan) -> Result<()> {
        let dest = self.transcoded_dest(&record.track_path);

        if dest.is_file() {
            let dest_mtime = mtime_secs(&dest)?;
            if record.mtime_secs() > dest_mtime + MTIME_TOLERANCE_SECS {
                // Only the metadata is refreshed; a change to the audio
                // itself won't be picked up here.
                plan.retag_jobs.push(RetagJob {
                    source: record.path.clone(),
                    dest,
                });
            } else {
                plan.stats.up_to_date += 1;
            }
            return Ok(());
        }

        plan.lossless_bytes += record.size;
        plan.lossless_jobs.push(TranscodeJob {
            source: record.path.clone(),
            dest,
            duration_seconds: self.estimate_duration(record),
        });
        Ok(())
    }

    /// Lossy files and covers are hardlinked into place unchanged.
    fn reconcile_lossy(&self, record: &FileRecord, plan: &mut SyncPlan) -> Result<()> {
        let rel_dir = Path::new(&record.track_path)
            .parent()
            .and_then(Path::to_str)
            .unwrap_or("");
        if self.index.music_dirs.get(rel_dir).map(PathBuf::as_path) != record.path.parent() {
            // The directory holds no recognized music under its canonical
            // owner; don't mirror strays out of it.
            plan.stats.skipped_no_music_dir += 1;
            return Ok(());
        }

        let dest = self.config.dest.join(record.rel_path());

        if record.extension == "mp3" {
            let transcoded = append_extension(&dest, self.config.lossy_ext());
            if transcoded.is_file() {
                if record.mtime_secs() > mtime_secs(&transcoded)? {
                    // Assume only the metadata got updated.
                    plan.retag_jobs.push(RetagJob {
                        source: record.path.clone(),
                        dest: transcoded,
                    });
                }
                return Ok(());
            }
        }

        if dest.is_file() {
            if same_inode(&record.path, &dest)? {
                plan.stats.up_to_date += 1;
                return Ok(());
            }
            // One side got replaced; the newer content wins and the other
            // side becomes a fresh hardlink to it.
            if record.mtime_secs() + MTIME_TOLERANCE_SECS >= mtime_secs(&dest)? {
                tracing::info!("replaced: {}", record.path.display());
                fs::remove_file(&dest)?;
                if self.link_file(&record.path, &dest, plan)? {
                    plan.stats.replaced_dest += 1;
                }
            } else {
                tracing::info!("replaced dest: {}", record.path.display());
                fs::remove_file(&record.path)?;
                if self.link_file(&dest, &record.path, plan)? {
                    plan.stats.replaced_source += 1;
                }
            }
            return Ok(());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        tracing::info!("new: {}", dest.display());
        if self.link_file(&record.path, &dest, plan)? {
            plan.stats.linked += 1;
        }
        Ok(())
    }

    /// Hardlink `src` to `dst`. A vanished source is fatal for the entry
    /// only; a cross-device attempt is fatal for the run.
    fn link_file(&self, src: &Path, dst: &Path, plan: &mut SyncPlan) -> Result<bool> {
        match fs::hard_link(src, dst) {
            Ok(()) => Ok(true),
            Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => Err(SyncError::CrossDevice(
                format!("{} -> {}", src.display(), dst.display()),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("source vanished before linking: {}", src.display());
                plan.stats.missing_sources += 1;
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("failed to link {}: {}", src.display(), e);
                Ok(false)
            }
        }
    }

    /// Queue high-bitrate (or, with no threshold, all) mp3 sources that lack
    /// a transcoded destination. Bitrates come from catalog-populated
    /// records; with a threshold set, an mp3 of unknown bitrate is left
    /// alone.
    fn collect_lossy_transcodes(&self, plan: &mut SyncPlan) {
        for record in self.index.seen.values() {
            if record.extension != "mp3" || !self.config.may_transcode(&record.path) {
                continue;
            }
            if self.config.min_transcode_bitrate > 0 {
                let Some(bitrate) = record.bitrate_kbps else {
                    continue;
                };
                if bitrate < self.config.min_transcode_bitrate {
                    continue;
                }
            }
            let dest = append_extension(
                &self.config.dest.join(record.rel_path()),
                self.config.lossy_ext(),
            );
            if dest.is_file() {
                continue;
            }
            plan.lossy_bytes += record.size;
            plan.lossy_jobs.push(TranscodeJob {
                source: record.path.clone(),
                dest,
                duration_seconds: self.estimate_duration(record),
            });
        }
    }

    /// Destination path of a track's transcoded form
    fn transcoded_dest(&self, track_path: &str) -> PathBuf {
        let mut rel = OsString::from(track_path);
        rel.push(self.config.lossy_ext());
        self.config.dest.join(PathBuf::from(rel))
    }

    /// Best available duration estimate: probe, then the record's known
    /// duration, then catalog, then size.
    fn estimate_duration(&self, record: &FileRecord) -> f64 {
        if let Ok(duration) = portatune_tags::probe_duration_seconds(&record.path) {
            if duration > 0.0 {
                return duration;
            }
        }
        if let Some(duration) = record.duration_seconds {
            return duration;
        }
        if let Some(info) = self.catalog.and_then(|c| c.get(&record.path)) {
            return info.duration_seconds;
        }
        record.size as f64 / BYTES_PER_SECOND_320K
    }
}

/// Append an already-dotted extension to a path, keeping the existing one
/// (`a/b.mp3` + `.m4a` = `a/b.mp3.m4a`).
pub(crate) fn append_extension(path: &Path, dotted_ext: &str) -> PathBuf {
    let mut os = path.to_path_buf().into_os_string();
    os.push(dotted_ext);
    PathBuf::from(os)
}

fn mtime_secs(path: &Path) -> Result<i64> {
    let metadata = fs::metadata(path)?;
    Ok(system_time_secs(
        metadata.modified().unwrap_or(std::time::UNIX_EPOCH),
    ))
}

fn same_inode(a: &Path, b: &Path) -> Result<bool> {
    let ma = fs::metadata(a)?;
    let mb = fs::metadata(b)?;
    Ok(ma.dev() == mb.dev() && ma.ino() == mb.ino())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::TreeScanner;
    use portatune_core::TargetCodec;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"audio").unwrap();
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
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

    fn reconcile(config: &SyncConfig) -> SyncPlan {
        let index = TreeScanner::new(&config.source, config.exclude.clone())
            .scan()
            .unwrap();
        ReconciliationEngine::new(config, &index, None)
            .reconcile()
            .unwrap()
    }

    #[test]
    fn test_new_lossy_file_is_hardlinked() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let src = config.source.join("Artist/Album/01.mp3");
        touch(&src);

        let plan = reconcile(&config);

        assert_eq!(plan.stats.linked, 1);
        let dest = config.dest.join("Artist/Album/01.mp3");
        assert!(dest.is_file());
        assert!(same_inode(&src, &dest).unwrap());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.source.join("Artist/Album/01.mp3"));
        touch(&config.source.join("Artist/Album/cover.jpg"));

        let first = reconcile(&config);
        assert_eq!(first.stats.linked, 2);

        let second = reconcile(&config);
        assert_eq!(second.stats.linked, 0);
        assert_eq!(second.stats.replaced_dest, 0);
        assert_eq!(second.stats.replaced_source, 0);
        assert!(second.retag_jobs.is_empty());
        assert!(second.lossless_jobs.is_empty());
        assert!(second.lossy_jobs.is_empty());
        assert_eq!(second.stats.up_to_date, 2);
    }

    #[test]
    fn test_lossless_without_dest_is_queued() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.source.join("Artist/Album/01 - Song.flac"));

        let plan = reconcile(&config);

        assert_eq!(plan.lossless_jobs.len(), 1);
        assert_eq!(
            plan.lossless_jobs[0].dest,
            config.dest.join("Artist/Album/01 - Song.m4a")
        );
        assert!(plan.lossless_jobs[0].duration_seconds > 0.0);
        assert!(plan.lossless_bytes > 0);
    }

    #[test]
    fn test_lossless_retag_threshold() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let src = config.source.join("Album/song.flac");
        touch(&src);
        let dest = config.dest.join("Album/song.m4a");
        touch(&dest);

        let now = SystemTime::now();
        set_mtime(&src, now);

        // dest only 1s older: within tolerance, no retag
        set_mtime(&dest, now - Duration::from_secs(1));
        let plan = reconcile(&config);
        assert!(plan.retag_jobs.is_empty());
        assert_eq!(plan.stats.up_to_date, 1);

        // dest 3s older: retagged
        set_mtime(&dest, now - Duration::from_secs(3));
        let plan = reconcile(&config);
        assert_eq!(plan.retag_jobs.len(), 1);
        assert_eq!(plan.retag_jobs[0].dest, dest);
    }

    #[test]
    fn test_transcoded_mp3_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let src = config.source.join("Album/song.mp3");
        touch(&src);
        let transcoded = config.dest.join("Album/song.mp3.m4a");
        touch(&transcoded);

        let now = SystemTime::now();
        set_mtime(&src, now);
        set_mtime(&transcoded, now + Duration::from_secs(5));

        let plan = reconcile(&config);
        assert_eq!(plan.stats.linked, 0);
        assert!(plan.retag_jobs.is_empty());
        assert!(!config.dest.join("Album/song.mp3").exists());
    }

    #[test]
    fn test_transcoded_mp3_with_newer_source_is_retagged() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let src = config.source.join("Album/song.mp3");
        touch(&src);
        let transcoded = config.dest.join("Album/song.mp3.m4a");
        touch(&transcoded);

        let now = SystemTime::now();
        set_mtime(&transcoded, now - Duration::from_secs(10));
        set_mtime(&src, now);

        let plan = reconcile(&config);
        assert_eq!(plan.retag_jobs.len(), 1);
        assert_eq!(plan.retag_jobs[0].source, src);
        assert_eq!(plan.retag_jobs[0].dest, transcoded);
    }

    #[test]
    fn test_replaced_source_wins_when_newer() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let src = config.source.join("Album/song.mp3");
        touch(&src);
        let dest = config.dest.join("Album/song.mp3");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"stale copy").unwrap();

        let now = SystemTime::now();
        set_mtime(&dest, now - Duration::from_secs(60));
        set_mtime(&src, now);

        let plan = reconcile(&config);
        assert_eq!(plan.stats.replaced_dest, 1);
        assert!(same_inode(&src, &dest).unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"audio");
    }

    #[test]
    fn test_replaced_dest_wins_when_newer() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let src = config.source.join("Album/song.mp3");
        touch(&src);
        let dest = config.dest.join("Album/song.mp3");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"newer copy").unwrap();

        let now = SystemTime::now();
        set_mtime(&src, now - Duration::from_secs(60));
        set_mtime(&dest, now);

        let plan = reconcile(&config);
        assert_eq!(plan.stats.replaced_source, 1);
        assert!(same_inode(&src, &dest).unwrap());
        assert_eq!(fs::read(&src).unwrap(), b"newer copy");
    }

    #[test]
    fn test_cover_only_directory_is_skipped() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.source.join("Scans/cover.jpg"));

        let plan = reconcile(&config);
        assert_eq!(plan.stats.skipped_no_music_dir, 1);
        assert!(!config.dest.join("Scans/cover.jpg").exists());
    }

    #[test]
    fn test_all_mp3s_transcoded_without_threshold() {
        let temp = TempDir::new().unwrap();
        let mut config = setup(&temp);
        config.min_transcode_bitrate = 0;
        touch(&config.source.join("Album/song.mp3"));

        let plan = reconcile(&config);
        // linked as-is and also queued for transcoding; the transcoded file
        // supersedes the link once the pipeline finishes
        assert_eq!(plan.stats.linked, 1);
        assert_eq!(plan.lossy_jobs.len(), 1);
        assert_eq!(
            plan.lossy_jobs[0].dest,
            config.dest.join("Album/song.mp3.m4a")
        );
    }

    #[test]
    fn test_threshold_requires_known_bitrate() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        touch(&config.source.join("Album/song.mp3"));

        // no catalog, so no bitrate: nothing meets the threshold
        let plan = reconcile(&config);
        assert!(plan.lossy_jobs.is_empty());
    }

    #[test]
    fn test_threshold_queues_only_high_bitrate_mp3s() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let loud = config.source.join("Album/loud.mp3");
        let quiet = config.source.join("Album/quiet.mp3");
        touch(&loud);
        touch(&quiet);

        let catalog_path = temp.path().join("catalog.json");
        fs::write(
            &catalog_path,
            format!(
                concat!(
                    r#"[{{"location":"file://{}","artist":"A","album":"B","title":"T","duration":200.0,"bitrate":320}},"#,
                    r#"{{"location":"file://{}","artist":"A","album":"B","title":"T","duration":100.0,"bitrate":128}}]"#
                ),
                loud.display(),
                quiet.display()
            ),
        )
        .unwrap();
        let catalog = MediaCatalog::load(&catalog_path, &config.source).unwrap();
        let index = TreeScanner::new(&config.source, Vec::new())
            .with_catalog(&catalog)
            .scan()
            .unwrap();
        let plan = ReconciliationEngine::new(&config, &index, Some(&catalog))
            .reconcile()
            .unwrap();

        assert_eq!(plan.lossy_jobs.len(), 1);
        assert_eq!(plan.lossy_jobs[0].source, loud);
        assert_eq!(
            plan.lossy_jobs[0].dest,
            config.dest.join("Album/loud.mp3.m4a")
        );
        assert!((plan.lossy_jobs[0].duration_seconds - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_append_extension() {
        assert_eq!(
            append_extension(Path::new("/d/a.mp3"), ".m4a"),
            Path::new("/d/a.mp3.m4a")
        );
    }
}
