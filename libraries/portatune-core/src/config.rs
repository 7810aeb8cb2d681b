//! Sync configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// AAC encoder quality target (~66 kbps, transparent enough for portable use)
pub const AAC_QUALITY: &str = "0.25";

/// Opus encoder bitrate target in kbps
pub const OPUS_BITRATE_KBPS: &str = "65";

/// Source files at or above this bitrate are re-transcoded (0 = all of them)
pub const MINIMUM_TRANSCODE_BITRATE: u32 = 320;

/// Destination mtimes may lag source mtimes by this much without a retag
pub const MTIME_TOLERANCE_SECS: i64 = 2;

/// Per-directory ignore file, one excluded name per line
pub const IGNORE_FILE_NAME: &str = "portatune-ignore.txt";

/// Directory names excluded from every scan, ignore files or not
pub const ALWAYS_EXCLUDED_DIRS: &[&str] = &["nophone", "EAC", ".sync"];

/// Target lossy codec for transcoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCodec {
    Aac,
    Opus,
}

impl TargetCodec {
    /// Extension of transcoded output files, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            TargetCodec::Aac => "m4a",
            TargetCodec::Opus => "opus",
        }
    }

    /// Extension with the leading dot, as appended to destination paths
    pub fn dotted_extension(&self) -> &'static str {
        match self {
            TargetCodec::Aac => ".m4a",
            TargetCodec::Opus => ".opus",
        }
    }
}

/// External codec executables invoked by the transcode pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecTools {
    #[serde(default = "default_mpg123")]
    pub mpg123: String,

    #[serde(default = "default_flac")]
    pub flac: String,

    #[serde(default = "default_opusenc")]
    pub opusenc: String,

    #[serde(default = "default_aac_encoder")]
    pub aac_encoder: String,
}

fn default_mpg123() -> String {
    "mpg123".to_string()
}

fn default_flac() -> String {
    "flac".to_string()
}

fn default_opusenc() -> String {
    "opusenc".to_string()
}

fn default_aac_encoder() -> String {
    "neroAacEnc".to_string()
}

impl Default for CodecTools {
    fn default() -> Self {
        Self {
            mpg123: default_mpg123(),
            flac: default_flac(),
            opusenc: default_opusenc(),
            aac_encoder: default_aac_encoder(),
        }
    }
}

/// Configuration for one synchronization pass
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source music tree
    pub source: PathBuf,

    /// Destination mirror
    pub dest: PathBuf,

    /// Absolute path prefixes excluded from the scan entirely
    pub exclude: Vec<PathBuf>,

    /// Absolute path prefixes excluded from transcoding only
    pub exclude_transcode: Vec<PathBuf>,

    /// Target codec for lossless and high-bitrate sources
    pub codec: TargetCodec,

    /// Minimum source bitrate (kbps) for lossy re-transcoding; 0 = all
    pub min_transcode_bitrate: u32,

    /// Prompt before removing obsolete destination files
    pub confirm_remove: bool,

    /// Fold album artist into artist when writing destination tags
    pub album_artist_workaround: bool,

    /// Optional media catalog used as a duration/bitrate oracle
    pub catalog_path: Option<PathBuf>,

    /// Directory for intermediate WAV files
    pub temp_dir: PathBuf,

    /// Codec executable names/paths
    pub tools: CodecTools,

    /// Worker pool size for the transcode pipeline
    pub workers: usize,
}

impl SyncConfig {
    /// Create a config with defaults for everything but the two roots
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            exclude: Vec::new(),
            exclude_transcode: Vec::new(),
            codec: TargetCodec::Aac,
            min_transcode_bitrate: MINIMUM_TRANSCODE_BITRATE,
            confirm_remove: true,
            album_artist_workaround: false,
            catalog_path: None,
            temp_dir: std::env::temp_dir(),
            tools: CodecTools::default(),
            workers: num_cpus::get(),
        }
    }

    /// Extension appended to transcoded destination paths, with the dot
    pub fn lossy_ext(&self) -> &'static str {
        self.codec.dotted_extension()
    }

    /// Whether a source path may be copied at all
    pub fn may_copy(&self, path: &Path) -> bool {
        !self.exclude.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Whether a source path may be transcoded
    pub fn may_transcode(&self, path: &Path) -> bool {
        self.may_copy(path)
            && !self
                .exclude_transcode
                .iter()
                .any(|prefix| path.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_extensions() {
        assert_eq!(TargetCodec::Aac.extension(), "m4a");
        assert_eq!(TargetCodec::Opus.dotted_extension(), ".opus");
    }

    #[test]
    fn test_exclusion_prefixes() {
        let mut config = SyncConfig::new("/music", "/mirror");
        config.exclude.push(PathBuf::from("/music/Audiobooks"));
        config
            .exclude_transcode
            .push(PathBuf::from("/music/Classical"));

        assert!(!config.may_copy(Path::new("/music/Audiobooks/a.mp3")));
        assert!(config.may_copy(Path::new("/music/Classical/b.mp3")));
        // trailing-slash style prefixes match whole components only
        assert!(config.may_copy(Path::new("/music/AudiobooksExtra/a.mp3")));

        assert!(!config.may_transcode(Path::new("/music/Classical/b.mp3")));
        assert!(!config.may_transcode(Path::new("/music/Audiobooks/a.mp3")));
        assert!(config.may_transcode(Path::new("/music/Pop/c.mp3")));
    }
}
