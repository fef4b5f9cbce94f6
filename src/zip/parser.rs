//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Entries therefore come back in central-directory order, which need not
//! match the order their data was written in.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::{PackError, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

fn truncated(_: std::io::Error) -> PackError {
    PackError::InvalidArchive("truncated Central Directory".to_string())
}

/// Low-level ZIP file parser.
///
/// Generic over the reader type to support both local files and HTTP
/// sources. Typically used through [`ZipExtractor`](super::ZipExtractor).
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: R) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // Common case first: no archive comment.
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf)?;

            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..=buf.len().saturating_sub(EndOfCentralDirectory::SIZE)).rev() {
            if buf.len() < EndOfCentralDirectory::SIZE {
                break;
            }
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field must account for the remaining bytes.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(PackError::InvalidArchive("not a ZIP file".to_string()))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The locator sits immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| PackError::InvalidArchive("missing ZIP64 locator".to_string()))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.reader.read_exact_at(locator_offset, &mut locator_buf)?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader
            .read_exact_at(locator.eocd64_offset, &mut eocd64_buf)?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries in the archive, in central-directory order.
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size
            || total_entries > cd_size / CDFH_MIN_SIZE as u64
        {
            return Err(PackError::InvalidArchive(
                "Central Directory exceeds archive bounds".to_string(),
            ));
        }

        // One read for the whole directory (a single Range request over HTTP)
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data)?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(&cd_data);

        for _ in 0..total_entries {
            entries.push(self.parse_cdfh(&mut cursor)?);
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    fn parse_cdfh(&self, cursor: &mut Cursor<&Vec<u8>>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig).map_err(truncated)?;
        if sig != CDFH_SIGNATURE {
            return Err(PackError::InvalidArchive(
                "bad Central Directory File Header".to_string(),
            ));
        }

        let mut fixed = [0u8; CDFH_MIN_SIZE - 4];
        cursor.read_exact(&mut fixed).map_err(truncated)?;
        let mut header = Cursor::new(&fixed[..]);

        let _version_made_by = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let _version_needed = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let _flags = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let compression_method = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let last_mod_time = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let last_mod_date = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let crc32 = header.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut compressed_size = header.read_u32::<LittleEndian>().map_err(truncated)? as u64;
        let mut uncompressed_size = header.read_u32::<LittleEndian>().map_err(truncated)? as u64;
        let file_name_length = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let extra_field_length = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let file_comment_length = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let _disk_number_start = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let _internal_attrs = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let _external_attrs = header.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut lfh_offset = header.read_u32::<LittleEndian>().map_err(truncated)? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes).map_err(truncated)?;
        // Lossy: legacy archives may carry CP437 names
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        let is_directory = file_name.ends_with('/');

        // ZIP64 extended information lives in extra field 0x0001
        let extra_field_end = cursor.position() + extra_field_length as u64;

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let field_size = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let field_end = cursor.position() + field_size as u64;

            if header_id == 0x0001 {
                // Only fields whose header value is saturated are present
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
                }
            }
            cursor.set_position(field_end);
        }

        cursor.set_position(extra_field_end + file_comment_length as u64);
        if cursor.position() > cursor.get_ref().len() as u64 {
            return Err(truncated(std::io::ErrorKind::UnexpectedEof.into()));
        }

        Ok(ZipFileEntry {
            file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            is_directory,
        })
    }

    /// Offset where an entry's (possibly compressed) data begins.
    ///
    /// The Local File Header's name and extra field lengths may differ from
    /// the Central Directory's, so the LFH itself is consulted.
    pub fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh_buf)?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(PackError::InvalidArchive(format!(
                "bad Local File Header for '{}'",
                entry.file_name
            )));
        }

        let file_name_length = u16::from_le_bytes([lfh_buf[26], lfh_buf[27]]) as u64;
        let extra_field_length = u16::from_le_bytes([lfh_buf[28], lfh_buf[29]]) as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        if data_offset.saturating_add(entry.compressed_size) > self.size {
            return Err(PackError::InvalidArchive(format!(
                "data for '{}' runs past the end of the archive",
                entry.file_name
            )));
        }

        Ok(data_offset)
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal stored archive holding `hello.txt` = "hi", assembled by hand.
    fn hand_made_archive(comment: &[u8]) -> Vec<u8> {
        let entry = ZipFileEntry {
            file_name: "hello.txt".to_string(),
            compression_method: CompressionMethod::Stored,
            compressed_size: 2,
            uncompressed_size: 2,
            crc32: crc32fast::hash(b"hi"),
            lfh_offset: 0,
            last_mod_time: 0,
            last_mod_date: 33,
            is_directory: false,
        };
        let mut out = Vec::new();
        entry.write_local_header(&mut out).unwrap();
        out.extend_from_slice(b"hi");
        let cd_offset = out.len() as u32;
        entry.write_central_header(&mut out).unwrap();
        let cd_size = out.len() as u32 - cd_offset;
        EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: 1,
            total_entries: 1,
            cd_size,
            cd_offset,
            comment_len: comment.len() as u16,
        }
        .write_to(&mut out)
        .unwrap();
        out.extend_from_slice(comment);
        out
    }

    #[test]
    fn lists_entries_and_locates_data() {
        let parser = ZipParser::new(hand_made_archive(b""));
        let entries = parser.list_files().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "hello.txt");
        assert_eq!(entries[0].uncompressed_size, 2);
        assert!(!entries[0].is_directory);
        assert_eq!(
            parser.get_data_offset(&entries[0]).unwrap(),
            (LFH_SIZE + "hello.txt".len()) as u64
        );
    }

    #[test]
    fn finds_eocd_behind_comment() {
        let parser = ZipParser::new(hand_made_archive(b"archive comment"));
        let entries = parser.list_files().unwrap();
        assert_eq!(entries[0].file_name, "hello.txt");
    }

    #[test]
    fn rejects_non_zip_data() {
        assert!(matches!(
            ZipParser::new(b"definitely not a zip archive".to_vec()).list_files(),
            Err(PackError::InvalidArchive(_))
        ));
        assert!(ZipParser::new(Vec::new()).list_files().is_err());
    }

    #[test]
    fn rejects_truncated_central_directory() {
        let mut data = hand_made_archive(b"");
        // Claim two entries while only one header is present
        let eocd = data.len() - EndOfCentralDirectory::SIZE;
        data[eocd + 8] = 2;
        data[eocd + 10] = 2;
        assert!(matches!(
            ZipParser::new(data).list_files(),
            Err(PackError::InvalidArchive(_))
        ));
    }
}
