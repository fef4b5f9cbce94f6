//! Error types shared by every runpack operation.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackError {
    /// The file or directory to archive (or delete, or download) is missing.
    #[error("Source does not exist: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    /// The archive to extract is missing.
    #[error("Archive does not exist: {}", .path.display())]
    ArchiveNotFound { path: PathBuf },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("Unsupported compression method {method} for entry '{entry}'")]
    UnsupportedCompression { entry: String, method: u16 },

    /// Entry path would resolve outside the extraction root.
    #[error("Unsafe entry path: {0}")]
    UnsafeEntryPath(String),

    #[error("Duplicate entry path: {0}")]
    DuplicateEntry(String),

    #[error("Entry '{entry}' declared {declared} bytes but {actual} were written")]
    SizeMismatch {
        entry: String,
        declared: u64,
        actual: u64,
    },

    #[error("CRC-32 mismatch in entry '{entry}'")]
    ChecksumMismatch { entry: String },

    #[error("Entry '{entry}' exceeds the 4 GiB ZIP limit")]
    EntryTooLarge { entry: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl PackError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        PackError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<reqwest::Error> for PackError {
    fn from(err: reqwest::Error) -> Self {
        PackError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PackError>;

/// Attaches a path to `std::io::Result` values.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| PackError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_keeps_path_and_source() {
        let err: Result<()> = Err(io::Error::other("disk gone")).at("/tmp/out.zip");
        match err {
            Err(PackError::Io { path, source }) => {
                assert_eq!(path, PathBuf::from("/tmp/out.zip"));
                assert_eq!(source.to_string(), "disk gone");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn not_found_messages_name_the_path() {
        let err = PackError::SourceNotFound {
            path: PathBuf::from("/nonexistent"),
        };
        assert_eq!(err.to_string(), "Source does not exist: /nonexistent");
    }
}
