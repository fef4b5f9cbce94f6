//! Streaming ZIP archive writer.
//!
//! Each entry is written as a Local File Header followed by its data. The
//! header carries the declared uncompressed size up front; CRC-32 and the
//! compressed size are unknown until the data has been streamed, so the
//! writer seeks back and patches them in once the entry completes. The
//! Central Directory and End of Central Directory follow the last entry.
//!
//! ZIP64 is not written: entries and archives must stay below 4 GiB and
//! 65535 entries.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::time::SystemTime;

use crate::error::{PackError, Result};

use super::structures::*;

const MAX_32: u64 = 0xFFFF_FFFE;

enum EntrySink<W: Write> {
    Plain(W),
    Deflate(DeflateEncoder<W>),
}

struct PendingEntry {
    entry: ZipFileEntry,
    data_start: u64,
    hasher: crc32fast::Hasher,
    written: u64,
}

/// ZIP writer over any seekable output.
///
/// Content for the current file entry is supplied through [`Write`].
pub struct ZipWriter<W: Write + Seek> {
    // None only after an I/O failure left the output in an unknown state
    sink: Option<EntrySink<W>>,
    current: Option<PendingEntry>,
    entries: Vec<ZipFileEntry>,
    names: HashSet<String>,
}

fn entry_io(name: &str) -> impl FnOnce(io::Error) -> PackError + '_ {
    move |e| PackError::io(name, e)
}

fn poisoned() -> io::Error {
    io::Error::other("ZIP writer is unusable after an earlier failure")
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            sink: Some(EntrySink::Plain(inner)),
            current: None,
            entries: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Number of entries completed so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Begin a file entry whose content will be exactly `size` bytes.
    ///
    /// Any entry still open is finished first. `modified` defaults to now.
    pub fn start_file(
        &mut self,
        name: &str,
        size: u64,
        method: CompressionMethod,
        modified: Option<SystemTime>,
    ) -> Result<()> {
        if let CompressionMethod::Unknown(code) = method {
            return Err(PackError::UnsupportedCompression {
                entry: name.to_string(),
                method: code,
            });
        }
        if size > MAX_32 {
            return Err(PackError::EntryTooLarge {
                entry: name.to_string(),
            });
        }

        let entry = self.begin_entry(name, method, size, false, modified)?;
        let mut inner = self.take_plain().map_err(entry_io(name))?;

        let lfh_offset = entry.lfh_offset;
        if let Err(e) = entry.write_local_header(&mut inner) {
            self.sink = Some(EntrySink::Plain(inner));
            return Err(PackError::io(name, e));
        }
        self.sink = Some(match method {
            CompressionMethod::Deflate => {
                EntrySink::Deflate(DeflateEncoder::new(inner, Compression::default()))
            }
            _ => EntrySink::Plain(inner),
        });

        self.current = Some(PendingEntry {
            data_start: lfh_offset + LFH_SIZE as u64 + name.len() as u64,
            entry,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        });
        Ok(())
    }

    /// Add a directory marker. A trailing `/` is appended when missing.
    pub fn add_directory(&mut self, name: &str, modified: Option<SystemTime>) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };

        let entry = self.begin_entry(&name, CompressionMethod::Stored, 0, true, modified)?;
        let mut inner = self.take_plain().map_err(entry_io(&name))?;
        let result = entry.write_local_header(&mut inner);
        self.sink = Some(EntrySink::Plain(inner));
        result.map_err(entry_io(&name))?;

        self.entries.push(entry);
        Ok(())
    }

    /// Complete the open entry, patching CRC-32 and sizes into its header.
    ///
    /// Returns the number of content bytes written, or 0 when no entry was
    /// open. Fails with [`PackError::SizeMismatch`] when the content length
    /// differs from the size given to [`start_file`](Self::start_file).
    pub fn finish_entry(&mut self) -> Result<u64> {
        let Some(pending) = self.current.take() else {
            return Ok(0);
        };
        let PendingEntry {
            mut entry,
            data_start,
            hasher,
            written,
        } = pending;
        let name = entry.file_name.clone();

        let mut inner = match self.sink.take() {
            Some(EntrySink::Plain(w)) => w,
            Some(EntrySink::Deflate(encoder)) => encoder.finish().map_err(entry_io(&name))?,
            None => return Err(PackError::io(&name, poisoned())),
        };

        let end = match inner.stream_position() {
            Ok(end) => end,
            Err(e) => return Err(PackError::io(&name, e)),
        };
        let compressed = end - data_start;

        if written != entry.uncompressed_size {
            self.sink = Some(EntrySink::Plain(inner));
            return Err(PackError::SizeMismatch {
                entry: name,
                declared: entry.uncompressed_size,
                actual: written,
            });
        }
        if compressed > MAX_32 || end > MAX_32 {
            self.sink = Some(EntrySink::Plain(inner));
            return Err(PackError::EntryTooLarge { entry: name });
        }

        entry.crc32 = hasher.finalize();
        entry.compressed_size = compressed;

        inner
            .seek(SeekFrom::Start(entry.lfh_offset + LFH_CRC_OFFSET))
            .and_then(|_| entry.write_sizes(&mut inner))
            .and_then(|_| inner.seek(SeekFrom::Start(end)))
            .map_err(entry_io(&name))?;

        self.sink = Some(EntrySink::Plain(inner));
        self.entries.push(entry);
        Ok(written)
    }

    /// Write the Central Directory and return the underlying output.
    pub fn finish(mut self) -> Result<W> {
        self.finish_entry()?;

        if self.entries.len() > 0xFFFF {
            return Err(PackError::EntryTooLarge {
                entry: format!("{} entries", self.entries.len()),
            });
        }

        let mut inner = self
            .take_plain()
            .map_err(|e| PackError::io("central directory", e))?;
        let write_directory = |inner: &mut W, entries: &[ZipFileEntry]| -> io::Result<(u64, u64)> {
            let cd_offset = inner.stream_position()?;
            for entry in entries {
                entry.write_central_header(inner)?;
            }
            let cd_end = inner.stream_position()?;
            Ok((cd_offset, cd_end - cd_offset))
        };
        let (cd_offset, cd_size) = write_directory(&mut inner, &self.entries)
            .map_err(|e| PackError::io("central directory", e))?;

        if cd_offset + cd_size > MAX_32 {
            return Err(PackError::EntryTooLarge {
                entry: "central directory".to_string(),
            });
        }

        let count = self.entries.len() as u16;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count,
            total_entries: count,
            cd_size: cd_size as u32,
            cd_offset: cd_offset as u32,
            comment_len: 0,
        }
        .write_to(&mut inner)
        .and_then(|_| inner.flush())
        .map_err(|e| PackError::io("end of central directory", e))?;

        Ok(inner)
    }

    /// Validate the name and build the entry record for a new header.
    fn begin_entry(
        &mut self,
        name: &str,
        method: CompressionMethod,
        size: u64,
        is_directory: bool,
        modified: Option<SystemTime>,
    ) -> Result<ZipFileEntry> {
        self.finish_entry()?;

        if name.is_empty() || name == "/" || name.len() > u16::MAX as usize {
            return Err(PackError::InvalidArchive(format!(
                "invalid entry name '{name}'"
            )));
        }
        if self.names.contains(name) {
            return Err(PackError::DuplicateEntry(name.to_string()));
        }

        let lfh_offset = match self.sink.as_mut() {
            Some(EntrySink::Plain(w)) => w.stream_position().map_err(entry_io(name))?,
            _ => return Err(PackError::io(name, poisoned())),
        };
        if lfh_offset > MAX_32 {
            return Err(PackError::EntryTooLarge {
                entry: name.to_string(),
            });
        }

        let (last_mod_time, last_mod_date) = dos_datetime(modified.unwrap_or_else(SystemTime::now));
        self.names.insert(name.to_string());

        Ok(ZipFileEntry {
            file_name: name.to_string(),
            compression_method: method,
            compressed_size: 0,
            uncompressed_size: size,
            crc32: 0,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            is_directory,
        })
    }

    fn take_plain(&mut self) -> io::Result<W> {
        match self.sink.take() {
            Some(EntrySink::Plain(w)) => Ok(w),
            Some(other) => {
                self.sink = Some(other);
                Err(poisoned())
            }
            None => Err(poisoned()),
        }
    }
}

impl<W: Write + Seek> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pending = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::other("no ZIP entry has been started"))?;

        let n = match self.sink.as_mut() {
            Some(EntrySink::Plain(w)) => w.write(buf)?,
            Some(EntrySink::Deflate(encoder)) => encoder.write(buf)?,
            None => return Err(poisoned()),
        };

        pending.hasher.update(&buf[..n]);
        pending.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(EntrySink::Plain(w)) => w.flush(),
            Some(EntrySink::Deflate(encoder)) => encoder.flush(),
            None => Err(poisoned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::ZipExtractor;
    use std::io::Cursor;

    fn new_writer() -> ZipWriter<Cursor<Vec<u8>>> {
        ZipWriter::new(Cursor::new(Vec::new()))
    }

    #[test]
    fn writes_files_and_directories() {
        let mut writer = new_writer();
        writer.add_directory("empty", None).unwrap();
        writer
            .start_file("a.txt", 3, CompressionMethod::Stored, None)
            .unwrap();
        writer.write_all(b"abc").unwrap();
        writer
            .start_file("sub/b.txt", 5, CompressionMethod::Deflate, None)
            .unwrap();
        writer.write_all(b"bbbbb").unwrap();
        let data = writer.finish().unwrap().into_inner();

        let extractor = ZipExtractor::new(data);
        let entries = extractor.list_files().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["empty/", "a.txt", "sub/b.txt"]);

        assert!(entries[0].is_directory);
        assert_eq!(entries[0].uncompressed_size, 0);
        assert_eq!(entries[1].uncompressed_size, 3);
        assert_eq!(entries[1].crc32, crc32fast::hash(b"abc"));
        assert_eq!(entries[2].uncompressed_size, 5);
        assert_eq!(extractor.extract_to_memory(&entries[2]).unwrap(), b"bbbbb");
    }

    #[test]
    fn local_header_is_patched_with_crc_and_sizes() {
        let mut writer = new_writer();
        writer
            .start_file("x", 4, CompressionMethod::Stored, None)
            .unwrap();
        writer.write_all(b"data").unwrap();
        let data = writer.finish().unwrap().into_inner();

        let crc = u32::from_le_bytes(data[14..18].try_into().unwrap());
        let compressed = u32::from_le_bytes(data[18..22].try_into().unwrap());
        let uncompressed = u32::from_le_bytes(data[22..26].try_into().unwrap());
        assert_eq!(crc, crc32fast::hash(b"data"));
        assert_eq!((compressed, uncompressed), (4, 4));
    }

    #[test]
    fn short_content_is_a_size_mismatch() {
        let mut writer = new_writer();
        writer
            .start_file("short.txt", 10, CompressionMethod::Deflate, None)
            .unwrap();
        writer.write_all(b"only6!").unwrap();
        assert!(matches!(
            writer.finish_entry(),
            Err(PackError::SizeMismatch {
                declared: 10,
                actual: 6,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut writer = new_writer();
        writer
            .start_file("same.txt", 0, CompressionMethod::Stored, None)
            .unwrap();
        assert!(matches!(
            writer.start_file("same.txt", 0, CompressionMethod::Stored, None),
            Err(PackError::DuplicateEntry(_))
        ));
    }

    #[test]
    fn write_without_entry_fails() {
        let mut writer = new_writer();
        assert!(writer.write_all(b"orphan").is_err());
    }

    #[test]
    fn empty_archive_is_valid() {
        let data = new_writer().finish().unwrap().into_inner();
        assert_eq!(data.len(), EndOfCentralDirectory::SIZE);
        assert!(ZipExtractor::new(data).list_files().unwrap().is_empty());
    }
}
