//! Audio format classification

use std::path::Path;

/// Lossy audio extensions (lowercase, no dot)
pub const LOSSY_EXTENSIONS: &[&str] = &["mp3", "m4a", "ogg", "oga", "wma", "mpc", "opus"];

/// Lossless audio extensions
pub const LOSSLESS_EXTENSIONS: &[&str] = &["flac", "wav"];

/// Cover art filenames recognized alongside music files
pub const COVER_FILENAMES: &[&str] = &[
    "cover.jpg",
    "albumart.jpg",
    "folder.jpg",
    "cover.png",
    "albumart.png",
    "folder.png",
];

/// Known non-music extensions that are skipped without a report
pub const SKIPPED_EXTENSIONS: &[&str] = &[
    "part", "swp", "txt", "jpg", "png", "bmp", "gif", "zip", "rar",
];

/// Classification of a scanned file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Lossless audio, candidate for transcoding
    Lossless,
    /// Lossy audio, candidate for hardlinking (or re-transcoding)
    Lossy,
    /// Recognized cover art, copied alongside the music
    Cover,
    /// Recognized non-music file, skipped silently
    Other,
    /// Anything else
    Unrecognized,
}

/// Get the lowercase extension of a path, without the leading dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if an extension is a recognized lossless format
pub fn is_lossless(ext: &str) -> bool {
    LOSSLESS_EXTENSIONS.contains(&ext)
}

/// Check if an extension is a recognized lossy format
pub fn is_lossy(ext: &str) -> bool {
    LOSSY_EXTENSIONS.contains(&ext)
}

/// Check if an extension is any recognized music format
pub fn is_music(ext: &str) -> bool {
    is_lossless(ext) || is_lossy(ext)
}

/// Classify a file by extension and filename
pub fn classify(path: &Path) -> FileKind {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if COVER_FILENAMES.contains(&filename.as_str()) {
        return FileKind::Cover;
    }

    match extension_of(path) {
        Some(ext) if is_lossless(&ext) => FileKind::Lossless,
        Some(ext) if is_lossy(&ext) => FileKind::Lossy,
        Some(ext) if SKIPPED_EXTENSIONS.contains(&ext.as_str()) => FileKind::Other,
        _ => FileKind::Unrecognized,
    }
}
