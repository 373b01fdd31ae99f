//! cardshelf - Character card library
//!
//! Stores character cards in a single directory, either as plain JSON
//! sidecars or embedded in PNG images, and reconciles two views of that
//! directory: the managed `index.json` and a scan of whatever files are
//! actually there.
//!
//! # Architecture
//!
//! - Cards are normalized to the V2 shape on every read and write
//! - The index is authoritative for identity; the scan discovers the rest
//! - Ids never resolve to a path outside the library root
//!
//! # Modules
//!
//! - `codec`: PNG chunk parsing and card embedding
//! - `domain`: Data structures (Card, LibraryItem, SaveFormat)
//! - `library`: Resolver, scanner, index store and the `Library` facade
//! - `config`: Library directory resolution for the binary
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Save a card as a JSON sidecar
//! cardshelf save rin.json
//!
//! # Save a card embedded into its avatar
//! cardshelf save rin.json --avatar rin.png
//!
//! # List everything in the library
//! cardshelf list
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod domain;
pub mod library;

// Re-export main types at crate root for convenience
pub use codec::{Chunk, PngError};
pub use domain::{Card, ItemSource, LibraryItem, SaveFormat};
pub use library::{ErrorKind, Library, LibraryError, LibraryOptions};
