use flate2::read::DeflateDecoder;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{IoResultExt, PackError, Result};
use crate::io::{ReadAt, StreamCopier};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &R {
        self.parser.reader()
    }

    /// List all files in the archive
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files()
    }

    /// Open a streaming reader over an entry's uncompressed content.
    ///
    /// The stream checks length and CRC-32 when it reaches the end and fails
    /// with [`PackError::SizeMismatch`] or [`PackError::ChecksumMismatch`].
    pub fn open_entry<'a>(&'a self, entry: &'a ZipFileEntry) -> Result<EntryReader<'a, R>> {
        let data_offset = self.parser.get_data_offset(entry)?;
        let section = SectionReader {
            reader: self.parser.reader(),
            offset: data_offset,
            remaining: entry.compressed_size,
        };

        let data = match entry.compression_method {
            CompressionMethod::Stored => EntryData::Stored(section),
            CompressionMethod::Deflate => EntryData::Deflate(DeflateDecoder::new(section)),
            CompressionMethod::Unknown(method) => {
                return Err(PackError::UnsupportedCompression {
                    entry: entry.file_name.clone(),
                    method,
                });
            }
        };

        Ok(EntryReader {
            data,
            entry,
            hasher: crc32fast::Hasher::new(),
            read: 0,
        })
    }

    /// Extract file data to memory
    pub fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry.uncompressed_size.min(1 << 20) as usize);
        let mut stream = self.open_entry(entry)?;
        stream
            .read_to_end(&mut buf)
            .map_err(|e| into_pack_error(e, &entry.file_name))?;
        Ok(buf)
    }

    /// Stream an entry into `writer`. Returns the number of bytes written.
    pub fn extract_to_writer<W: Write + ?Sized>(
        &self,
        entry: &ZipFileEntry,
        writer: &mut W,
        copier: StreamCopier,
    ) -> Result<u64> {
        let mut stream = self.open_entry(entry)?;
        copier
            .copy(&mut stream, writer)
            .map_err(|e| into_pack_error(e, &entry.file_name))
    }

    /// Extract file to disk, creating missing parent directories and
    /// replacing whatever file was there.
    pub fn extract_to_file(
        &self,
        entry: &ZipFileEntry,
        output_path: &Path,
        copier: StreamCopier,
    ) -> Result<u64> {
        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).at(parent)?;
        }

        let mut stream = self.open_entry(entry)?;
        let mut file = fs::File::create(output_path).at(output_path)?;
        copier
            .copy(&mut stream, &mut file)
            .map_err(|e| into_pack_error(e, output_path))
    }
}

/// Recover a [`PackError`] raised inside an [`EntryReader`], or wrap a plain
/// I/O error with `path`.
fn into_pack_error(err: io::Error, path: impl AsRef<Path>) -> PackError {
    if err.get_ref().is_some_and(|inner| inner.is::<PackError>()) {
        if let Some(inner) = err.into_inner()
            && let Ok(pack) = inner.downcast::<PackError>()
        {
            return *pack;
        }
        return PackError::InvalidArchive("corrupt entry data".to_string());
    }
    PackError::io(path, err)
}

/// A byte range of the archive exposed as [`Read`].
struct SectionReader<'a, R: ReadAt> {
    reader: &'a R,
    offset: u64,
    remaining: u64,
}

impl<R: ReadAt> Read for SectionReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (buf.len() as u64).min(self.remaining) as usize;
        if want == 0 {
            return Ok(0);
        }

        let n = self
            .reader
            .read_at(self.offset, &mut buf[..want])
            .map_err(io::Error::other)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

enum EntryData<'a, R: ReadAt> {
    Stored(SectionReader<'a, R>),
    Deflate(DeflateDecoder<SectionReader<'a, R>>),
}

/// Uncompressed content of one archive entry.
pub struct EntryReader<'a, R: ReadAt> {
    data: EntryData<'a, R>,
    entry: &'a ZipFileEntry,
    hasher: crc32fast::Hasher,
    read: u64,
}

impl<R: ReadAt> EntryReader<'_, R> {
    fn fail(&self, err: PackError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }

    fn size_mismatch(&self) -> io::Error {
        self.fail(PackError::SizeMismatch {
            entry: self.entry.file_name.clone(),
            declared: self.entry.uncompressed_size,
            actual: self.read,
        })
    }
}

impl<R: ReadAt> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.data {
            EntryData::Stored(section) => section.read(buf)?,
            EntryData::Deflate(decoder) => decoder.read(buf)?,
        };

        if n == 0 {
            if buf.is_empty() {
                return Ok(0);
            }
            if self.read != self.entry.uncompressed_size {
                return Err(self.size_mismatch());
            }
            if self.hasher.clone().finalize() != self.entry.crc32 {
                return Err(self.fail(PackError::ChecksumMismatch {
                    entry: self.entry.file_name.clone(),
                }));
            }
            return Ok(0);
        }

        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        if self.read > self.entry.uncompressed_size {
            return Err(self.size_mismatch());
        }
        Ok(n)
    }
}
