//! # zipserve
//!
//! Serve individual files out of ZIP archives without unpacking them up front.
//!
//! A request path is resolved to an entry inside an archive, the entry is
//! decompressed once onto a plain-file cache next to the archive, and later
//! requests for the same path are answered straight from that cache.
//!
//! ## Features
//!
//! - Depth-aware matching: address content nested under a common top-level
//!   folder as if the folder did not exist
//! - Default documents (`index.html`) and redirects for directory entries
//! - Extract-once cache with atomic writes and de-duplicated concurrent extraction
//! - ZIP64, STORED and DEFLATE support with CRC-32 verification
//!
//! ## Example
//!
//! ```no_run
//! use zipserve::{ContentResolver, Method, Mount, WriterSender, respond};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = ContentResolver::new(Mount::new("./data")?);
//!
//!     let resolution = resolver.route(Method::Get, "/site/img/logo.png").await?;
//!     let mut sender = WriterSender::new(tokio::io::stdout());
//!     let status = respond(&mut sender, &resolution, false).await?;
//!     eprintln!("{status}");
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod io;
pub mod logging;
pub mod mount;
pub mod path;
pub mod resolver;
pub mod sender;
pub mod zip;

pub use cache::ExtractionCache;
pub use cli::Cli;
pub use io::{LocalFileReader, ReadAt};
pub use mount::{ArchiveListing, Mount};
pub use resolver::{ContentResolver, Method, Resolution};
pub use sender::{StaticSender, Status, WriterSender, respond};
pub use zip::{Archive, ZipEntry};
