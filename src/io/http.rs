use reqwest::blocking::{Client, ClientBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use crate::error::{PackError, Result};

/// HTTP Range reader for remote ZIP files
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to verify Range support and get file size
    pub fn new(url: String) -> Result<Self> {
        Self::with_client(client_builder().build()?, url)
    }

    fn with_client(client: Client, url: String) -> Result<Self> {
        let resp = client.head(&url).send()?;

        if !resp.status().is_success() {
            return Err(PackError::Http(format!(
                "request failed with status: {}",
                resp.status()
            )));
        }

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            return Err(PackError::Http(
                "remote server does not support Range requests".to_string(),
            ));
        }

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                PackError::Http("remote server did not return Content-Length".to_string())
            })?;

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

/// Requests never time out; a stalled server blocks the caller like any
/// other stalled source.
fn client_builder() -> ClientBuilder {
    Client::builder().timeout(None::<Duration>)
}

/// Inclusive byte range header value, clamped to the resource size.
fn range_header(offset: u64, len: usize, size: u64) -> (String, usize) {
    let end = (offset + len as u64 - 1).min(size - 1);
    (
        format!("bytes={}-{}", offset, end),
        (end - offset + 1) as usize,
    )
}

impl ReadAt for HttpRangeReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let (_, expected_size) = range_header(offset, buf.len(), self.size);

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let (range, _) =
                range_header(offset + received as u64, expected_size - received, self.size);

            match self.client.get(&self.url).header("Range", &range).send() {
                Ok(resp) => {
                    if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
                        return Err(PackError::Http(format!(
                            "range request failed with status: {}",
                            resp.status()
                        )));
                    }

                    let bytes = resp.bytes()?;
                    if bytes.is_empty() {
                        break;
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(PackError::Http("max retries exceeded".to_string()));
                    }
                    tracing::warn!(
                        "Connection error, retry {}/{}: {}",
                        retry_count,
                        self.max_retry,
                        e
                    );
                    std::thread::sleep(Duration::from_millis(500 * retry_count as u64));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
