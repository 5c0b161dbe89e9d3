//! ZIP archive parsing, entry discovery and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP format records (EOCD, ZIP64 records, entries, local headers)
//! - [`parser`]: reads those records through [`ReadAt`](crate::io::ReadAt)
//! - [`archive`]: the per-request [`Archive`] handle that turns central
//!   directory parsing into a pushed stream of entries and answers
//!   find-one/find-all lookups, byte streaming and extraction on top of it
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE compression methods
//! - CRC-32 verification on extraction
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod archive;
mod parser;
mod structures;

pub use archive::{Archive, Discovery, DiscoveryStream, EntryReader};
pub use parser::{CentralDirectory, ZipParser};
pub use structures::*;
