//! Fixed-buffer stream copying.

use std::io::{self, ErrorKind, Read, Write};

/// Buffer size used for download transfers (2 KiB).
pub const TRANSFER_BUFFER_SIZE: usize = 2 * 1024;

/// Buffer size used when copying archive entry content (10 KiB).
pub const ARCHIVE_BUFFER_SIZE: usize = 10 * 1024;

/// Copies a reader into a writer through a fixed-size buffer.
///
/// The copier never closes either side: callers keep ownership of both streams
/// and may continue writing to the destination afterwards, which is how one
/// archive writer receives the content of many files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCopier {
    buffer_size: usize,
}

impl StreamCopier {
    /// A zero `buffer_size` is clamped to one byte.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn transfer() -> Self {
        Self::new(TRANSFER_BUFFER_SIZE)
    }

    pub fn archive() -> Self {
        Self::new(ARCHIVE_BUFFER_SIZE)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Copy until `reader` reports end of stream, then flush `writer`.
    ///
    /// Returns the number of bytes copied.
    pub fn copy<R, W>(&self, reader: &mut R, writer: &mut W) -> io::Result<u64>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut buf = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            writer.write_all(&buf[..n])?;
            total += n as u64;
        }

        writer.flush()?;
        Ok(total)
    }
}

impl Default for StreamCopier {
    fn default() -> Self {
        Self::archive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
        reads: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            let n = self.data.len().min(self.chunk).min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct FlushTracker {
        data: Vec<u8>,
        flushed: bool,
    }

    impl Write for FlushTracker {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    #[test]
    fn default_sizes() {
        assert_eq!(StreamCopier::transfer().buffer_size(), 2048);
        assert_eq!(StreamCopier::archive().buffer_size(), 10240);
        assert_eq!(StreamCopier::new(0).buffer_size(), 1);
    }

    #[test]
    fn small_buffer_copies_everything_and_flushes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut reader = Trickle {
            data: &data,
            chunk: 1000,
            reads: 0,
        };
        let mut out = FlushTracker {
            data: Vec::new(),
            flushed: false,
        };

        let copied = StreamCopier::new(7).copy(&mut reader, &mut out).unwrap();

        assert_eq!(copied, 1000);
        assert_eq!(out.data, data);
        assert!(out.flushed);
        // 1000 / 7 rounded up, plus the final zero-length read
        assert_eq!(reader.reads, 144);
    }

    #[test]
    fn destination_stays_usable_after_copy() {
        let copier = StreamCopier::new(4);
        let mut out = Vec::new();
        copier.copy(&mut Cursor::new(b"first"), &mut out).unwrap();
        copier.copy(&mut Cursor::new(b"-second"), &mut out).unwrap();
        assert_eq!(out, b"first-second");
    }

    #[test]
    fn empty_source_copies_nothing() {
        let mut out = Vec::new();
        let copied = StreamCopier::transfer()
            .copy(&mut io::empty(), &mut out)
            .unwrap();
        assert_eq!(copied, 0);
        assert!(out.is_empty());
    }
}
