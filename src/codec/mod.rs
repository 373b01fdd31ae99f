//! Binary codecs for card storage.
//!
//! - `png`: PNG chunk parsing/serialization and `tEXt` card embedding

pub mod png;

pub use png::{embed_card, extract_card, parse, serialize, Chunk, PngError};
