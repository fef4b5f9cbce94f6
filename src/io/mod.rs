mod copy;
mod http;
mod local;

pub use copy::{ARCHIVE_BUFFER_SIZE, StreamCopier, TRANSFER_BUFFER_SIZE};
pub use http::HttpRangeReader;
pub use local::LocalFileReader;

use crate::error::{PackError, Result};

/// Trait for random access reading from a data source
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`, failing if the source ends first
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.read_at(offset, buf)?;
            if n == 0 {
                return Err(PackError::InvalidArchive(format!(
                    "unexpected end of data at offset {offset}"
                )));
            }
            offset += n as u64;
            let rest = buf;
            buf = &mut rest[n..];
        }
        Ok(())
    }
}

#[cfg(test)]
impl ReadAt for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = (offset as usize).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}
