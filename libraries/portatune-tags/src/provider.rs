//! Tag reading and writing via lofty

use crate::error::{Result, TagError};
use lofty::{AudioFile, ItemKey, Probe, Tag, TagType, TaggedFileExt};
use std::collections::BTreeMap;
use std::path::Path;

/// Normalized tag fields shared across container formats.
///
/// A single logical field may map to differently-named native fields per
/// format; the mapping lives in [`TagField::item_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TagField {
    Title,
    Artist,
    Album,
    AlbumArtist,
    TrackNumber,
    TrackTotal,
    DiscNumber,
    DiscTotal,
    Date,
    Genre,
    Comment,
    Composer,
    Copyright,
    EncodedBy,
    Performer,
}

/// All fields the provider reads from a source file
pub const ALL_FIELDS: &[TagField] = &[
    TagField::Title,
    TagField::Artist,
    TagField::Album,
    TagField::AlbumArtist,
    TagField::TrackNumber,
    TagField::TrackTotal,
    TagField::DiscNumber,
    TagField::DiscTotal,
    TagField::Date,
    TagField::Genre,
    TagField::Comment,
    TagField::Composer,
    TagField::Copyright,
    TagField::EncodedBy,
    TagField::Performer,
];

impl TagField {
    /// The lofty item key backing this field
    pub fn item_key(self) -> ItemKey {
        match self {
            TagField::Title => ItemKey::TrackTitle,
            TagField::Artist => ItemKey::TrackArtist,
            TagField::Album => ItemKey::AlbumTitle,
            TagField::AlbumArtist => ItemKey::AlbumArtist,
            TagField::TrackNumber => ItemKey::TrackNumber,
            TagField::TrackTotal => ItemKey::TrackTotal,
            TagField::DiscNumber => ItemKey::DiscNumber,
            TagField::DiscTotal => ItemKey::DiscTotal,
            TagField::Date => ItemKey::RecordingDate,
            TagField::Genre => ItemKey::Genre,
            TagField::Comment => ItemKey::Comment,
            TagField::Composer => ItemKey::Composer,
            TagField::Copyright => ItemKey::CopyrightMessage,
            TagField::EncodedBy => ItemKey::EncodedBy,
            TagField::Performer => ItemKey::Performer,
        }
    }

    /// Whether this field holds a track/disc index compared canonically
    pub fn is_index(self) -> bool {
        matches!(self, TagField::TrackNumber | TagField::DiscNumber)
    }
}

/// Mapping from normalized field to value
pub type TagMap = BTreeMap<TagField, String>;

/// Container format family, determined by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFamily {
    /// MP3 with ID3v2 tags
    Id3,
    /// MP4/M4A ilst atoms
    Mp4,
    /// FLAC with Vorbis comments
    Flac,
    /// WAV with RIFF INFO or ID3v2 tags (read side only)
    Wav,
    /// Ogg Opus
    Opus,
    /// Ogg Vorbis (`.ogg`/`.oga`)
    OggVorbis,
}

impl TagFamily {
    /// Resolve the family for a path by its (lowercased) extension
    pub fn for_path(path: &Path) -> Option<TagFamily> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "mp3" => Some(TagFamily::Id3),
            "m4a" | "mp4" => Some(TagFamily::Mp4),
            "flac" => Some(TagFamily::Flac),
            "wav" => Some(TagFamily::Wav),
            "opus" => Some(TagFamily::Opus),
            "ogg" | "oga" => Some(TagFamily::OggVorbis),
            _ => None,
        }
    }

    /// The lofty tag type this family is written as
    pub fn tag_type(self) -> TagType {
        match self {
            TagFamily::Id3 | TagFamily::Wav => TagType::Id3v2,
            TagFamily::Mp4 => TagType::Mp4Ilst,
            TagFamily::Flac | TagFamily::Opus | TagFamily::OggVorbis => TagType::VorbisComments,
        }
    }

    /// Fields that may be written for this family.
    ///
    /// The MP4 ilst mapping only covers a fixed set of well-known atoms; the
    /// Ogg Vorbis set is the conventional recognized field list. Opus and the
    /// read-side families accept everything.
    pub fn writable_fields(self) -> &'static [TagField] {
        match self {
            TagFamily::Mp4 => &[
                TagField::Title,
                TagField::Artist,
                TagField::Album,
                TagField::AlbumArtist,
                TagField::TrackNumber,
                TagField::TrackTotal,
                TagField::DiscNumber,
                TagField::DiscTotal,
                TagField::Date,
                TagField::Genre,
                TagField::Comment,
                TagField::Composer,
                TagField::Copyright,
            ],
            TagFamily::OggVorbis => &[
                TagField::Title,
                TagField::Artist,
                TagField::AlbumArtist,
                TagField::Album,
                TagField::TrackNumber,
                TagField::DiscNumber,
                TagField::Date,
                TagField::Genre,
                TagField::Copyright,
                TagField::EncodedBy,
                TagField::Performer,
            ],
            _ => ALL_FIELDS,
        }
    }

    /// Whether destination fields absent from the source are deleted.
    ///
    /// Only the Ogg Vorbis family enumerates a fixed recognized tag set;
    /// the other writable formats are additive/overwrite-only.
    pub fn deletes_unlisted(self) -> bool {
        matches!(self, TagFamily::OggVorbis)
    }
}

/// Capability for reading and writing normalized tags
pub trait TagProvider {
    /// Read all recognized fields from a file
    fn read_tags(&self, path: &Path) -> Result<TagMap>;

    /// Write the given fields and remove the listed ones, in one pass
    fn write_tags(&self, path: &Path, set: &TagMap, remove: &[TagField]) -> Result<()>;
}

/// Tag provider backed by the lofty library
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagProvider;

impl LoftyTagProvider {
    /// Create a new provider
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<lofty::TaggedFile> {
        if !path.exists() {
            return Err(TagError::FileNotFound(path.display().to_string()));
        }
        // Content-based type detection: staged ".part" files carry an
        // extension lofty cannot resolve by name.
        let tagged = Probe::open(path)?
            .guess_file_type()
            .map_err(TagError::Io)?
            .read()?;
        Ok(tagged)
    }
}

impl TagProvider for LoftyTagProvider {
    fn read_tags(&self, path: &Path) -> Result<TagMap> {
        let tagged = Self::open(path)?;
        let mut tags = TagMap::new();

        let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
        if let Some(tag) = tag {
            for field in ALL_FIELDS {
                if let Some(value) = tag.get_string(&field.item_key()) {
                    tags.insert(*field, value.to_string());
                }
            }
        }

        Ok(tags)
    }

    fn write_tags(&self, path: &Path, set: &TagMap, remove: &[TagField]) -> Result<()> {
        let mut tagged = Self::open(path)?;
        let tag_type = tagged.primary_tag_type();

        if tagged.tag(tag_type).is_none() {
            tagged.insert_tag(Tag::new(tag_type));
        }
        let Some(tag) = tagged.tag_mut(tag_type) else {
            return Err(TagError::WriteError(format!(
                "no writable tag in {}",
                path.display()
            )));
        };

        for (field, value) in set {
            tag.insert_text(field.item_key(), value.clone());
        }
        for field in remove {
            tag.remove_key(&field.item_key());
        }

        tagged.save_to_path(path)?;
        Ok(())
    }
}

/// Probe a file's playable duration in seconds
pub fn probe_duration_seconds(path: &Path) -> Result<f64> {
    let tagged = LoftyTagProvider::open(path)?;
    Ok(tagged.properties().duration().as_secs_f64())
}
