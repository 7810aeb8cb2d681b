//! Cross-format metadata synchronization

use crate::error::{Result, TagError};
use crate::index::canonical_index;
use crate::provider::{LoftyTagProvider, TagFamily, TagField, TagMap, TagProvider};
use std::path::Path;

/// Staging suffix used by the transcode pipeline
const PART_SUFFIX: &str = ".part";

/// Planned edits for one destination file
#[derive(Debug, Default, PartialEq)]
pub(crate) struct TagDiff {
    pub set: TagMap,
    pub remove: Vec<TagField>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// Reconciles one source file's tags into one destination file's tags.
///
/// Reads everything from the source, diffs against the destination's current
/// tags, and persists only when at least one field actually differs, so an
/// unchanged destination keeps its mtime.
#[derive(Debug, Clone)]
pub struct MetadataSynchronizer<P: TagProvider = LoftyTagProvider> {
    provider: P,
    album_artist_workaround: bool,
}

impl MetadataSynchronizer<LoftyTagProvider> {
    /// Create a synchronizer with the default lofty provider
    pub fn new(album_artist_workaround: bool) -> Self {
        Self::with_provider(LoftyTagProvider::new(), album_artist_workaround)
    }
}

impl<P: TagProvider> MetadataSynchronizer<P> {
    /// Create a synchronizer around a specific provider
    pub fn with_provider(provider: P, album_artist_workaround: bool) -> Self {
        Self {
            provider,
            album_artist_workaround,
        }
    }

    /// Copy the source file's tags onto the destination file.
    ///
    /// Returns whether any destination field changed. No partial write
    /// happens when either side's format is unsupported.
    pub fn synchronize(&self, source: &Path, dest: &Path) -> Result<bool> {
        TagFamily::for_path(source)
            .filter(|f| {
                matches!(
                    f,
                    TagFamily::Flac | TagFamily::Wav | TagFamily::Id3 | TagFamily::Mp4
                )
            })
            .ok_or_else(|| TagError::UnsupportedFormat(source.display().to_string()))?;

        // Destination may still be a staged ".part" file; its real format is
        // the extension underneath.
        let logical_dest = strip_part_suffix(dest);
        let dst_family = TagFamily::for_path(&logical_dest)
            .filter(|f| {
                matches!(f, TagFamily::Mp4 | TagFamily::Opus | TagFamily::OggVorbis)
            })
            .ok_or_else(|| TagError::UnsupportedFormat(dest.display().to_string()))?;

        let mut source_tags = self.provider.read_tags(source)?;
        if self.album_artist_workaround {
            apply_album_artist_workaround(&mut source_tags);
        }

        let dest_tags = self.provider.read_tags(dest)?;
        let diff = plan_changes(dst_family, &source_tags, &dest_tags);
        if diff.is_empty() {
            return Ok(false);
        }

        for (field, value) in &diff.set {
            tracing::info!(
                "changed: {:?} ({:?} => {:?})",
                field,
                dest_tags.get(field),
                value
            );
        }
        for field in &diff.remove {
            tracing::info!("deleted: {:?} ({:?})", field, dest_tags.get(field));
        }

        self.provider.write_tags(dest, &diff.set, &diff.remove)?;
        Ok(true)
    }
}

/// Some media players only partially support the album artist tag; fold it
/// into the artist field instead.
fn apply_album_artist_workaround(tags: &mut TagMap) {
    if let Some(album_artist) = tags.remove(&TagField::AlbumArtist) {
        tags.insert(TagField::Artist, album_artist);
    }
}

fn strip_part_suffix(path: &Path) -> std::path::PathBuf {
    match path.to_str() {
        Some(s) if s.ends_with(PART_SUFFIX) => {
            std::path::PathBuf::from(&s[..s.len() - PART_SUFFIX.len()])
        }
        _ => path.to_path_buf(),
    }
}

/// Compute which destination fields to write and which to delete.
///
/// Track/disc numbers are compared by canonical index so encoder padding
/// differences don't force a rewrite. For the Ogg Vorbis family, destination
/// fields absent from the source are deleted; all other families are
/// additive/overwrite-only.
pub(crate) fn plan_changes(family: TagFamily, source: &TagMap, dest: &TagMap) -> TagDiff {
    let mut diff = TagDiff::default();
    let writable = family.writable_fields();

    for (field, value) in source {
        if !writable.contains(field) {
            continue;
        }
        let current = dest.get(field);
        let equal = if field.is_index() {
            canonical_index(Some(value)) == canonical_index(current.map(String::as_str))
        } else {
            current == Some(value)
        };
        if !equal {
            diff.set.insert(*field, value.clone());
        }
    }

    if family.deletes_unlisted() {
        for field in dest.keys() {
            if !source.contains_key(field) {
                diff.remove.push(*field);
            }
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(entries: &[(TagField, &str)]) -> TagMap {
        entries
            .iter()
            .map(|(f, v)| (*f, (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_no_changes_when_equal() {
        let src = tags(&[
            (TagField::Title, "Song"),
            (TagField::Artist, "Artist"),
            (TagField::TrackNumber, "3"),
        ]);
        let diff = plan_changes(TagFamily::Mp4, &src, &src.clone());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_index_padding_tolerated() {
        let src = tags(&[(TagField::TrackNumber, "03")]);
        let dst = tags(&[(TagField::TrackNumber, "3")]);
        assert!(plan_changes(TagFamily::Mp4, &src, &dst).is_empty());

        let dst = tags(&[(TagField::TrackNumber, "4")]);
        let diff = plan_changes(TagFamily::Mp4, &src, &dst);
        assert_eq!(diff.set.get(&TagField::TrackNumber).unwrap(), "03");
    }

    #[test]
    fn test_mp4_skips_unwritable_fields() {
        let src = tags(&[(TagField::EncodedBy, "someencoder")]);
        let dst = TagMap::new();
        assert!(plan_changes(TagFamily::Mp4, &src, &dst).is_empty());
    }

    #[test]
    fn test_ogg_deletes_fields_missing_from_source() {
        let src = tags(&[(TagField::Title, "Song")]);
        let dst = tags(&[(TagField::Title, "Song"), (TagField::Genre, "Rock")]);
        let diff = plan_changes(TagFamily::OggVorbis, &src, &dst);
        assert!(diff.set.is_empty());
        assert_eq!(diff.remove, vec![TagField::Genre]);
    }

    #[test]
    fn test_opus_is_additive_only() {
        let src = tags(&[(TagField::Title, "Song")]);
        let dst = tags(&[(TagField::Title, "Old"), (TagField::Genre, "Rock")]);
        let diff = plan_changes(TagFamily::Opus, &src, &dst);
        assert_eq!(diff.set.get(&TagField::Title).unwrap(), "Song");
        assert!(diff.remove.is_empty());
    }

    #[test]
    fn test_album_artist_workaround() {
        let mut src = tags(&[
            (TagField::Artist, "Track Artist"),
            (TagField::AlbumArtist, "Album Artist"),
        ]);
        apply_album_artist_workaround(&mut src);
        assert_eq!(src.get(&TagField::Artist).unwrap(), "Album Artist");
        assert!(!src.contains_key(&TagField::AlbumArtist));
    }

    #[test]
    fn test_strip_part_suffix() {
        assert_eq!(
            strip_part_suffix(Path::new("/d/a.m4a.part")),
            Path::new("/d/a.m4a")
        );
        assert_eq!(strip_part_suffix(Path::new("/d/a.m4a")), Path::new("/d/a.m4a"));
    }

    #[test]
    fn test_unsupported_destination_format() {
        let sync = MetadataSynchronizer::new(false);
        let result = sync.synchronize(Path::new("/x/a.flac"), Path::new("/x/a.wma"));
        assert!(matches!(result, Err(TagError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_wav_source_passes_format_validation() {
        // wav sources get past family checks; the failure here is only the
        // files not existing
        let sync = MetadataSynchronizer::new(false);
        let result = sync.synchronize(Path::new("/x/a.wav"), Path::new("/x/a.m4a.part"));
        assert!(matches!(result, Err(TagError::FileNotFound(_))));
    }
}
