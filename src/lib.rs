//! Epub unpacker
//!
//! A Rust library that unpacks EPUB archives onto disk and extracts their
//! structure: title, manifest, spine and EPUB 2 NCX navigation.
//!
//! The archive is extracted into a staging directory inside a library
//! root, then moved into a directory named after the book title. The
//! package and navigation documents are parsed from the extracted tree and
//! turned into an ordered chapter list whose content files can be read
//! later, from any thread.
//!
//! ## Features
//!
//! - Container-driven package discovery, with a directory scan fallback.
//! - Per-item problems are collected as diagnostics instead of failing the
//!   whole load.
//! - Chapters in document order, or sorted by `playOrder` on request.
//! - Archive entries that would escape the destination are rejected.
//!
//! ## Quick Start
//!
//! ```rust, ignore
//! # use epub_unpacker::{config::LoaderConfig, epub::EpubLoader};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = EpubLoader::new(LoaderConfig::new("path/to/library"));
//! let book = loader.load("path/to/book.epub")?;
//!
//! println!("Title: {}", book.book.title);
//! for diagnostic in &book.diagnostics {
//!     println!("skipped: {diagnostic}");
//! }
//!
//! // Read content
//! let first = &book.chapters[0];
//! let _content = book.read_chapter(first)?;
//! # Ok(())
//! # }
//! ```
//!
//! The individual steps are public as well: [`archive`], [`container`],
//! [`package`], [`navigation`] and [`title`] can be used on their own.

pub(crate) mod utils;

pub mod archive;
pub mod config;
pub mod container;
pub mod epub;
pub mod error;
pub mod navigation;
pub mod package;
pub mod title;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use config::LoaderConfig;
pub use epub::{ChapterReader, EpubLoader, LoadEvent, LoadedBook};
pub use error::EpubError;
pub use utils::DecodeBytes;
