//! Portatune tag handling
//!
//! Cross-format metadata synchronization for the sync tool:
//! - Tag reading/writing through a `TagProvider` capability (lofty-backed)
//! - Canonical track/disc index normalization
//! - `MetadataSynchronizer`, which reconciles one source file's tags into
//!   one destination file's tags and reports whether anything changed

mod error;
mod index;
mod provider;
mod sync;

pub use error::{Result, TagError};
pub use index::canonical_index;
pub use provider::{
    probe_duration_seconds, LoftyTagProvider, TagFamily, TagField, TagMap, TagProvider,
};
pub use sync::MetadataSynchronizer;
