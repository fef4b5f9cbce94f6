//! Streaming a byte source to a client as a downloadable attachment.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{IoResultExt, PackError, Result};
use crate::io::StreamCopier;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// One outbound download: content, display name and (when known) length.
///
/// Consumed by [`stream_download`]; a descriptor cannot be sent twice.
pub struct TransferDescriptor<R: Read> {
    content: R,
    name: String,
    length: Option<u64>,
}

impl<R: Read> TransferDescriptor<R> {
    pub fn new(content: R, name: impl Into<String>, length: Option<u64>) -> Self {
        Self {
            content,
            name: name.into(),
            length,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }
}

impl TransferDescriptor<File> {
    /// Describe a file on disk. The display name is `rename` when given and
    /// non-empty, else the file's base name.
    pub fn from_path(path: &Path, rename: Option<&str>) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PackError::SourceNotFound {
                path: path.to_path_buf(),
            },
            _ => PackError::io(path, e),
        })?;
        let length = file.metadata().at(path)?.len();

        let name = match rename {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".to_string()),
        };

        Ok(Self::new(file, name, Some(length)))
    }
}

/// The response side of a download.
///
/// Metadata can only be set before [`into_body`](DownloadSink::into_body)
/// hands out the byte stream, since the sink is consumed there.
pub trait DownloadSink {
    type Body: Write;

    fn set_header(&mut self, name: &str, value: &str);

    fn set_content_length(&mut self, length: u64);

    fn into_body(self) -> io::Result<Self::Body>;
}

/// `Content-Disposition` value with the name percent-encoded.
pub fn attachment_disposition(name: &str) -> String {
    format!("attachment; filename={}", urlencoding::encode(name))
}

/// Send `content` through `sink`. Returns the number of body bytes written.
///
/// Headers are set first, then the body is streamed with a 2 KiB buffer.
/// Source and body are dropped on every exit path.
pub fn stream_download<R: Read, S: DownloadSink>(
    content: TransferDescriptor<R>,
    mut sink: S,
) -> Result<u64> {
    let TransferDescriptor {
        mut content,
        name,
        length,
    } = content;

    sink.set_header(CONTENT_TYPE, OCTET_STREAM);
    sink.set_header(CONTENT_DISPOSITION, &attachment_disposition(&name));
    if let Some(length) = length {
        sink.set_content_length(length);
    }

    let mut body = sink.into_body().at(&name)?;
    let sent = StreamCopier::transfer()
        .copy(&mut content, &mut body)
        .at(&name)?;

    tracing::info!("Sent {} ({} bytes)", name, sent);
    Ok(sent)
}

/// Writes a raw HTTP/1.1 response: status line, headers, blank line, body.
pub struct HttpResponseSink<W: Write> {
    out: W,
    headers: Vec<(String, String)>,
}

impl<W: Write> HttpResponseSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            headers: Vec::new(),
        }
    }
}

impl<W: Write> DownloadSink for HttpResponseSink<W> {
    type Body = W;

    fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    fn set_content_length(&mut self, length: u64) {
        self.set_header("Content-Length", &length.to_string());
    }

    fn into_body(mut self) -> io::Result<W> {
        write!(self.out, "HTTP/1.1 200 OK\r\n")?;
        for (name, value) in &self.headers {
            write!(self.out, "{}: {}\r\n", name, value)?;
        }
        write!(self.out, "\r\n")?;
        Ok(self.out)
    }
}
