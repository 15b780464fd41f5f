//! In-memory sink used by the unit tests.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::error::{Capability, Error};
use crate::writer::{Flusher, Hijacker, ResponseWriter};

/// Records everything that reaches it and behaves like the real sink: the
/// head is committed by the first write, later status changes are ignored.
pub(crate) struct RecordingSink {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub chunks: Vec<Bytes>,
    pub head_committed: bool,
    pub flushes: usize,
    pub hijacked: bool,
    fail_after: Option<usize>,
    flush_capable: bool,
    upgrade: Option<OnUpgrade>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            chunks: Vec::new(),
            head_committed: false,
            flushes: 0,
            hijacked: false,
            fail_after: None,
            flush_capable: false,
            upgrade: None,
        }
    }

    /// Accept `n` writes, then fail every following one.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn with_flush(mut self) -> Self {
        self.flush_capable = true;
        self
    }

    pub fn with_upgrade(mut self) -> Self {
        self.upgrade = Some(hyper::upgrade::on(http::Request::new(())));
        self
    }

    pub fn status_or_default(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn body(&self) -> String {
        self.chunks
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }
}

impl ResponseWriter for RecordingSink {
    fn set_status(&mut self, status: StatusCode) {
        if !self.head_committed {
            self.status = Some(status);
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, Error> {
        if self.fail_after.is_some_and(|n| self.chunks.len() >= n) {
            return Err(Error::write_failure("recording sink closed"));
        }
        self.head_committed = true;
        self.chunks.push(Bytes::copy_from_slice(chunk));
        Ok(chunk.len())
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.upgrade.is_some() { Some(self) } else { None }
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        if self.flush_capable { Some(self) } else { None }
    }
}

impl Hijacker for RecordingSink {
    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        let upgrade = self
            .upgrade
            .take()
            .ok_or(Error::CapabilityUnsupported(Capability::Hijack))?;
        self.hijacked = true;
        Ok(upgrade)
    }
}

impl Flusher for RecordingSink {
    fn flush(&mut self) -> Result<(), Error> {
        self.head_committed = true;
        self.flushes += 1;
        Ok(())
    }
}
