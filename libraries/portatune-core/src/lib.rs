//! Portatune core types
//!
//! Shared building blocks for the portatune sync tool:
//! - Audio format classification (lossy/lossless/cover art)
//! - The `FileRecord` produced by tree scanning
//! - Sync configuration and target codec settings

mod config;
mod formats;
mod types;

pub use config::{
    CodecTools, SyncConfig, TargetCodec, AAC_QUALITY, ALWAYS_EXCLUDED_DIRS, IGNORE_FILE_NAME,
    MINIMUM_TRANSCODE_BITRATE, MTIME_TOLERANCE_SECS, OPUS_BITRATE_KBPS,
};
pub use formats::{classify, extension_of, is_lossless, is_lossy, is_music, FileKind};
pub use types::{system_time_secs, FileRecord};
