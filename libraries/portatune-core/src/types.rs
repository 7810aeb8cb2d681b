//! Shared data types

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single file found by the tree scanner.
///
/// The `track_path` (relative path with the extension removed) is the stable
/// identity used to match a source file against its destination counterpart
/// regardless of container format. Records are immutable once produced.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Relative path without extension, e.g. `Artist/Album/01 - Song`
    pub track_path: String,

    /// Lowercase extension without the dot, e.g. `flac`
    pub extension: String,

    /// Absolute path of the file
    pub path: PathBuf,

    /// Modification time
    pub mtime: SystemTime,

    /// File size in bytes
    pub size: u64,

    /// Playable duration, when known (catalog or probe)
    pub duration_seconds: Option<f64>,

    /// Audio bitrate in kbps, when known
    pub bitrate_kbps: Option<u32>,
}

impl FileRecord {
    /// Relative path including the extension
    pub fn rel_path(&self) -> String {
        if self.extension.is_empty() {
            self.track_path.clone()
        } else {
            format!("{}.{}", self.track_path, self.extension)
        }
    }

    /// Modification time as seconds since the epoch
    pub fn mtime_secs(&self) -> i64 {
        system_time_secs(self.mtime)
    }
}

/// Convert a `SystemTime` to whole seconds since the epoch
pub fn system_time_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rel_path() {
        let record = FileRecord {
            track_path: "Artist/Album/01 - Song".to_string(),
            extension: "flac".to_string(),
            path: PathBuf::from("/music/Artist/Album/01 - Song.flac"),
            mtime: UNIX_EPOCH,
            size: 0,
            duration_seconds: None,
            bitrate_kbps: None,
        };
        assert_eq!(record.rel_path(), "Artist/Album/01 - Song.flac");
    }

    #[test]
    fn test_system_time_secs() {
        assert_eq!(system_time_secs(UNIX_EPOCH), 0);
        assert_eq!(
            system_time_secs(UNIX_EPOCH + Duration::from_secs(1_000)),
            1_000
        );
    }
}
