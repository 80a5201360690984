//! Bounded CRLF line reading over an async byte stream (`LineReader`).
//! A small read-ahead buffer wraps the underlying stream so both the
//! request parser and the header collector can pull one line at a time.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProxyError;

const READ_CHUNK: usize = 4096;

pub struct LineReader<S> {
    stream: S,
    carry: Vec<u8>,
}

impl<S> LineReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        LineReader {
            stream,
            carry: Vec::new(),
        }
    }

    /// Reads one line, terminator included. A line whose total length
    /// (terminator pending) exceeds `max_len` is a hard error
    /// (`HTTP_LINE_LENGTH`). EOF before any terminator is a
    /// `PeerClose`.
    pub async fn read_line(&mut self, max_len: usize) -> Result<Vec<u8>, ProxyError> {
        loop {
            if let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.carry.drain(..=pos).collect();
                return Ok(line);
            }
            if self.carry.len() > max_len {
                return Err(ProxyError::HeaderOverflow);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ProxyError::PeerClose);
            }
            self.carry.extend_from_slice(&chunk[..n]);
        }
    }

    /// Reads the first non-blank line (content other than the terminator
    /// itself), retrying on bare CRLFs to tolerate a peer that sends
    /// leading blank lines ahead of the request line.  
    pub async fn read_nonblank_line(&mut self, max_len: usize) -> Result<Vec<u8>, ProxyError> {
        loop {
            let line = self.read_line(max_len).await?;
            if !is_blank(&line) {
                return Ok(line);
            }
        }
    }

    /// Reads exactly `n` bytes, using any carried-over bytes first.
    pub async fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>, ProxyError> {
        while self.carry.len() < n {
            let mut chunk = [0u8; READ_CHUNK];
            let read = self.stream.read(&mut chunk).await?;
            if read == 0 {
                return Err(ProxyError::PeerClose);
            }
            self.carry.extend_from_slice(&chunk[..read]);
        }
        Ok(self.carry.drain(..n).collect())
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), ProxyError> {
        self.stream.write_all(buf).await.map_err(ProxyError::Io)
    }

    /// Hands the underlying stream back along with any bytes already read
    /// past the header boundary (normally empty for well-formed HTTP).
    pub fn into_parts(self) -> (S, Vec<u8>) {
        (self.stream, self.carry)
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

/// A line is "blank" when its content, minus the terminator, is empty:
/// bare `\n` or `\r\n`.
fn is_blank(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n")
}
