//! Framework-independent proxy responses.
//!
//! The handler builds a `ProxyResponse`; the Pingora adapter writes its
//! header and then pulls the body chunk by chunk. Bodies backed by a file or
//! an origin stream are never read into memory as a whole.

use std::io;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncReadExt;

use crate::constants::STREAM_CHUNK_SIZE;
use crate::origin::ByteStream;

pub enum ResponseBody {
    Empty,
    Bytes(Bytes),
    /// `remaining` bytes from the file's current position
    File { file: tokio::fs::File, remaining: u64 },
    /// Origin bytes, dropping the first `skip` and stopping after
    /// `remaining` when set
    Stream {
        stream: ByteStream,
        skip: u64,
        remaining: Option<u64>,
    },
}

impl ResponseBody {
    /// Next chunk of the body, or None once it is exhausted
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self {
            ResponseBody::Empty => Ok(None),
            ResponseBody::Bytes(bytes) => {
                if bytes.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(std::mem::take(bytes)))
                }
            }
            ResponseBody::File { file, remaining } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                let want = (*remaining).min(STREAM_CHUNK_SIZE as u64) as usize;
                let mut buf = BytesMut::zeroed(want);
                let read = file.read(&mut buf).await?;
                if read == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "cache file shorter than its recorded size",
                    ));
                }
                buf.truncate(read);
                *remaining -= read as u64;
                Ok(Some(buf.freeze()))
            }
            ResponseBody::Stream {
                stream,
                skip,
                remaining,
            } => loop {
                if *remaining == Some(0) {
                    return Ok(None);
                }
                let mut chunk = match stream.next().await {
                    Some(chunk) => chunk?,
                    None => return Ok(None),
                };
                if *skip > 0 {
                    let dropped = (*skip).min(chunk.len() as u64) as usize;
                    chunk = chunk.slice(dropped..);
                    *skip -= dropped as u64;
                }
                if chunk.is_empty() {
                    continue;
                }
                if let Some(left) = remaining.as_mut() {
                    if chunk.len() as u64 > *left {
                        chunk.truncate(*left as usize);
                    }
                    *left -= chunk.len() as u64;
                }
                return Ok(Some(chunk));
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ResponseBody::Empty => true,
            ResponseBody::Bytes(bytes) => bytes.is_empty(),
            ResponseBody::File { remaining, .. } => *remaining == 0,
            ResponseBody::Stream { remaining, .. } => *remaining == Some(0),
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Bytes(b) => write!(f, "Bytes({})", b.len()),
            ResponseBody::File { remaining, .. } => write!(f, "File(remaining={})", remaining),
            ResponseBody::Stream { skip, remaining, .. } => {
                write!(f, "Stream(skip={}, remaining={:?})", skip, remaining)
            }
        }
    }
}

#[derive(Debug)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: ResponseBody,
}

impl ProxyResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    /// JSON body with Content-Type and Content-Length set
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        let body = value.to_string();
        let mut response = Self::new(status);
        response.set_header("Content-Type", "application/json");
        response.set_header("Content-Length", body.len().to_string());
        response.body = ResponseBody::Bytes(Bytes::from(body));
        response
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json(
            status,
            serde_json::json!({
                "error": message,
                "status": status,
            }),
        )
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set a header, replacing any earlier value (names compare
    /// case-insensitively)
    pub fn set_header(&mut self, name: &'static str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Same status and headers, no body (HEAD). Drops any open file or
    /// origin stream.
    pub fn without_body(mut self) -> Self {
        self.body = ResponseBody::Empty;
        self
    }

    /// Drain the body into memory
    pub async fn collect_body(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.body.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}
