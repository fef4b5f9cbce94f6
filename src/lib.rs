//! # runpack
//!
//! File packaging and transfer primitives for server-side applications.
//!
//! This library creates ZIP archives from a file or a directory tree,
//! extracts ZIP archives back into a directory tree, and streams arbitrary
//! byte sources to a client as a downloadable attachment. Content is always
//! streamed through fixed-size buffers; only entry metadata is kept in memory.
//!
//! ## Features
//!
//! - Archive a single file or a whole directory tree, optionally keeping the
//!   top-level folder name
//! - Extract archives from local files or HTTP/HTTPS URLs (Range requests)
//! - Reject entries that would escape the extraction directory
//! - STORED and DEFLATE entries, CRC-32 verified on extraction
//! - Recursive deletion that treats an absent path as already deleted
//! - Attachment downloads with headers set before the first body byte
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use runpack::{ArchiveOptions, ExtractOptions, create_archive, extract_archive};
//!
//! fn main() -> runpack::Result<()> {
//!     let options = ArchiveOptions::default().keep_folder(true);
//!     create_archive(Path::new("reports"), Path::new("reports.zip"), &options)?;
//!     extract_archive(Path::new("reports.zip"), Path::new("restored"), &ExtractOptions::default())?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod download;
pub mod error;
pub mod fs;
pub mod io;
pub mod zip;

pub use archive::{ArchiveOptions, ExtractOptions, PackStats, create_archive, extract_archive, extract_from};
pub use cli::Cli;
pub use download::{DownloadSink, HttpResponseSink, TransferDescriptor, stream_download};
pub use error::{PackError, Result};
pub use fs::{delete_path, delete_path_with};
pub use io::{HttpRangeReader, LocalFileReader, ReadAt, StreamCopier};
pub use zip::{CompressionMethod, ZipExtractor, ZipFileEntry, ZipWriter};
