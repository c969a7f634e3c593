use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const IO_CHUNK_SIZE: usize = 8 * 1024;

/// Anything the frontend can serve a connection over.
pub trait ConnStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ConnStream for T {}

/// Byte counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Buffered client connection. Reads go through an internal buffer so the
/// frontend can peek and check for leftover bytes; writes are buffered
/// until [`FeConn::flush`]. Both directions keep cumulative byte counts.
pub struct FeConn {
    stream: Box<dyn ConnStream>,
    local_addr: String,
    peer_addr: Option<SocketAddr>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    bytes_read: u64,
    bytes_written: u64,
    reported: ConnStats,
    closed: bool,
}

impl FeConn {
    pub fn new(stream: tokio::net::TcpStream) -> Self {
        let local_addr = stream
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        let peer_addr = stream.peer_addr().ok();
        Self::from_parts(Box::new(stream), local_addr, peer_addr)
    }

    /// Wraps an arbitrary stream; `local_addr` labels the connection's
    /// telemetry and `peer_addr` feeds network restrictions when known.
    pub fn from_parts(
        stream: Box<dyn ConnStream>,
        local_addr: String,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            stream,
            local_addr,
            peer_addr,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
            bytes_read: 0,
            bytes_written: 0,
            reported: ConnStats::default(),
            closed: false,
        }
    }

    /// The listener-side address string used in telemetry labels.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Bytes sitting unconsumed in the read buffer.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Waits until at least one byte is buffered and returns it without
    /// consuming it.
    pub async fn peek(&mut self) -> io::Result<u8> {
        while self.read_buf.is_empty() {
            if self.fill().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while idle",
                ));
            }
        }
        Ok(self.read_buf[0])
    }

    /// Consumes and returns buffered input up to and including the first
    /// occurrence of `pattern`. `Ok(None)` means the peer went away before
    /// any byte of this block arrived.
    pub(crate) async fn read_until(
        &mut self,
        pattern: &[u8],
        max_bytes: usize,
    ) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(start) = find_subsequence(&self.read_buf, pattern) {
                let end = start + pattern.len();
                return Ok(Some(self.read_buf.drain(..end).collect()));
            }

            if self.read_buf.len() > max_bytes {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "HTTP header exceeded configured limit",
                ));
            }

            let read = match self.fill().await {
                Ok(read) => read,
                Err(error) => {
                    if self.read_buf.is_empty() {
                        return Ok(None);
                    }
                    return Err(error);
                }
            };
            if read == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before message boundary was reached",
                ));
            }
        }
    }

    /// Consumes up to `max` buffered or incoming bytes. `Ok(empty)` is EOF.
    pub async fn read(&mut self, max: usize) -> io::Result<Vec<u8>> {
        if self.read_buf.is_empty() && self.fill().await? == 0 {
            return Ok(Vec::new());
        }
        let take = max.min(self.read_buf.len());
        Ok(self.read_buf.drain(..take).collect())
    }

    /// Appends to the write buffer; the bytes reach the peer on `flush`.
    pub fn write(&mut self, data: &[u8]) {
        self.bytes_written += data.len() as u64;
        self.write_buf.extend_from_slice(data);
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            let data = std::mem::take(&mut self.write_buf);
            self.stream.write_all(&data).await?;
        }
        self.stream.flush().await
    }

    /// Shuts the stream down. Buffered but unflushed output is dropped.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.stream.shutdown().await;
    }

    /// Cumulative totals since construction.
    pub fn stats(&self) -> ConnStats {
        ConnStats {
            bytes_read: self.bytes_read,
            bytes_written: self.bytes_written,
        }
    }

    /// Totals accumulated since the previous `take_delta` call. The
    /// pipeline emits exactly one delta per request.
    pub fn take_delta(&mut self) -> ConnStats {
        let current = self.stats();
        let delta = ConnStats {
            bytes_read: current.bytes_read - self.reported.bytes_read,
            bytes_written: current.bytes_written - self.reported.bytes_written,
        };
        self.reported = current;
        delta
    }

    async fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0_u8; IO_CHUNK_SIZE];
        let read = self.stream.read(&mut chunk).await?;
        self.bytes_read += read as u64;
        self.read_buf.extend_from_slice(&chunk[..read]);
        Ok(read)
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
