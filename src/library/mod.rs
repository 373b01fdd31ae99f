//! Character card library.
//!
//! A library is a single flat directory. Cards live there as a JSON sidecar,
//! a PNG with the card embedded, or both, sharing one file stem. Other
//! tools may drop files in directly; those are found by scanning.
//!
//! # Storage Layout
//!
//! ```text
//! <library>/
//! ├── index.json                      # Managed items: id, name, createdAt, updatedAt
//! ├── Rin-1700000000000.json          # Sidecar form (plain V2 card JSON)
//! ├── Mio-1700000000123.png           # Image form (tEXt "chara" = base64 card JSON)
//! └── dropped_in_by_hand.png          # Filesystem item (not in index.json)
//! ```

pub mod error;
pub mod ids;
pub mod index;
pub mod scanner;
pub mod store;

pub use error::{ErrorKind, LibraryError};
pub use ids::{decode_id, encode_id, resolve_candidates, safe_base, ResolvedPaths};
pub use index::{read_index, write_index, Index, IndexEntry, INDEX_FILE};
pub use scanner::{derive_name, scan, DerivedName, NameSource, ScanCache};
pub use store::{Library, LibraryOptions, DEFAULT_DISPLAY_NAME};
