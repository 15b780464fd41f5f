//! Response buffering.
//!
//! [`BufferedWriter`] sits between a handler and the real sink. Everything
//! the handler does (status, headers, body) is held back until
//! [`commit`](BufferedWriter::commit) replays it onto the real sink, or
//! thrown away by [`discard`](BufferedWriter::discard). Until one of those
//! happens the client has seen nothing.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::error::Error;
use crate::writer::{Flusher, Hijacker, ResponseWriter};

/// A [`ResponseWriter`] that defers every observable effect.
///
/// One per request; it borrows the real sink for its whole life and is
/// consumed by either `commit` or `discard`.
pub struct BufferedWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
    headers: HeaderMap,
    chunks: Vec<Bytes>,
}

impl<'a> BufferedWriter<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { inner, status: None, headers: HeaderMap::new(), chunks: Vec::new() }
    }

    /// The status the handler selected last, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Total number of body bytes held back.
    pub fn buffered_len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// Replays headers, status and body chunks onto the real sink, in that
    /// order, and returns the number of body bytes delivered.
    ///
    /// Without a pending status the real sink keeps its own default. The
    /// first failing chunk aborts the replay; nothing is retried.
    pub fn commit(self) -> Result<usize, Error> {
        let Self { inner, status, headers, chunks } = self;

        if !headers.is_empty() {
            inner.headers_mut().extend(headers);
        }
        if let Some(status) = status {
            inner.set_status(status);
        }

        let mut written = 0;
        for chunk in chunks {
            written += inner.write(&chunk)?;
        }
        Ok(written)
    }

    /// Drops everything the handler produced. The real sink is not touched.
    /// Returns the number of body bytes that were thrown away.
    pub fn discard(self) -> usize {
        self.buffered_len()
    }
}

impl ResponseWriter for BufferedWriter<'_> {
    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, Error> {
        self.chunks.push(Bytes::copy_from_slice(chunk));
        Ok(chunk.len())
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        self.inner.hijacker()
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        self.inner.flusher()
    }
}
