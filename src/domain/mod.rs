//! Domain types for cardshelf.
//!
//! This module contains the core data structures:
//! - Card: Canonical V2 character card and its normalizer
//! - Item: Library items, save formats and facade results

pub mod card;
pub mod item;

// Re-export commonly used types
pub use card::{
    build_from_payload, filename_from, normalize_imported, Card, CARD_SPEC, CARD_SPEC_VERSION,
    DEFAULT_FILE_STEM,
};
pub use item::{
    format_system_time, timestamp_now, ItemSource, LibraryItem, LibraryList, LoadResult,
    SaveFormat, SaveResult,
};
