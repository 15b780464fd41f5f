//! The response-writing surface handlers see.
//!
//! A handler never builds a response value. It receives a
//! `&mut dyn ResponseWriter` and pushes a status, headers and body chunks
//! into it, in whatever order its logic produces them. What happens to
//! those writes depends on the sink behind the trait object: the real sink
//! streams them to the client, the buffered sink holds them until the
//! handler has returned.
//!
//! # Capabilities
//!
//! Some sinks can do more than write bytes. Those extras are exposed as
//! separate traits and queried at runtime, so nothing is ever called on a
//! sink that cannot honour it:
//!
//! ```rust,no_run
//! use mend::{BoxFuture, Request, ResponseWriter, writer};
//!
//! fn stream(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let _ = w.write(b"first part");
//!         // No-op when the sink cannot flush.
//!         let _ = writer::flush(w);
//!     })
//! }
//! ```

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::error::{Capability, Error};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values for use with [`ResponseWriter::set_content_type`].
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Html,  // text/html; charset=utf-8
    Text,  // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// A sink for one response.
///
/// Status and headers only take effect if they are set before the head is
/// committed. On the real sink that happens at the first `write`; on the
/// buffered sink it happens when the buffer is committed. A sink that never
/// sees a status falls back to `200 OK`.
pub trait ResponseWriter: Send {
    /// Selects the response status. Last call wins.
    fn set_status(&mut self, status: StatusCode);

    /// Headers that will be sent with the response head.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Writes one body chunk, returning the number of bytes accepted.
    fn write(&mut self, chunk: &[u8]) -> Result<usize, Error>;

    fn set_content_type(&mut self, content_type: ContentType) {
        self.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
    }

    /// The connection-takeover capability, if this sink has it.
    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    /// The incremental-flush capability, if this sink has it.
    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }
}

/// Hands control of the underlying connection to the handler.
///
/// The returned [`OnUpgrade`] resolves once the response head (normally a
/// `101 Switching Protocols`) has been written.
pub trait Hijacker {
    fn hijack(&mut self) -> Result<OnUpgrade, Error>;
}

/// Pushes whatever has been written so far out to the client.
///
/// On the real sink this commits the response head. Flushing from inside a
/// buffered handler therefore sends the head early, and a later panic can no
/// longer change the status.
pub trait Flusher {
    fn flush(&mut self) -> Result<(), Error>;
}

/// Requests the connection-takeover capability from `w`.
///
/// Fails with [`Error::CapabilityUnsupported`] when the sink cannot give up
/// its connection, for example on HTTP/2 or a request that did not ask to
/// upgrade.
pub fn hijack(w: &mut dyn ResponseWriter) -> Result<OnUpgrade, Error> {
    match w.hijacker() {
        Some(hijacker) => hijacker.hijack(),
        None => Err(Error::CapabilityUnsupported(Capability::Hijack)),
    }
}

/// Flushes `w` if it supports flushing. Advisory: a sink without the
/// capability is left untouched and `Ok(())` is returned.
pub fn flush(w: &mut dyn ResponseWriter) -> Result<(), Error> {
    match w.flusher() {
        Some(flusher) => flusher.flush(),
        None => Ok(()),
    }
}
