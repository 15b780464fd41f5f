//! The real sink: a [`ResponseWriter`] wired to a hyper response.
//!
//! hyper wants a complete `http::Response` (head plus a body stream) from the
//! service future, while handlers write imperatively. The bridge is two
//! channels:
//!
//! ```text
//!   worker task                                service future
//!   ───────────                                ──────────────
//!   StreamingSink ── oneshot<Head> ─────────►  awaits head, builds Response
//!                 ── mpsc<Bytes> ──► ChunkBody (the response body hyper polls)
//! ```
//!
//! The head is committed on the first write, an explicit flush, or when the
//! sink is dropped, whichever comes first. After that, status and header
//! changes are ignored, just as on the wire.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use hyper::body::{Body, Frame};
use hyper::upgrade::OnUpgrade;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Capability, Error};
use crate::writer::{Flusher, Hijacker, ResponseWriter};

/// Status and headers of a response, sent once.
pub(crate) struct Head {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl Head {
    pub(crate) fn into_response(self, body: ChunkBody) -> http::Response<ChunkBody> {
        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

/// Response body fed chunk by chunk from a [`StreamingSink`]. Ends when the
/// sink is dropped.
pub(crate) struct ChunkBody {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl ChunkBody {
    /// A body that ends immediately.
    pub(crate) fn empty() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self { rx }
    }
}

impl Body for ChunkBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        self.get_mut().rx.poll_recv(cx).map(|chunk| chunk.map(|b| Ok(Frame::data(b))))
    }
}

/// The sink a request's response is ultimately written to.
pub(crate) struct StreamingSink {
    status: StatusCode,
    headers: HeaderMap,
    head: Option<oneshot::Sender<Head>>,
    body: mpsc::UnboundedSender<Bytes>,
    upgrade: Option<OnUpgrade>,
}

impl StreamingSink {
    /// Creates a sink together with the receiving ends the service future
    /// turns into a response. `upgrade` is the request's upgrade handle, if
    /// the connection can be taken over.
    pub(crate) fn channel(
        upgrade: Option<OnUpgrade>,
    ) -> (Self, oneshot::Receiver<Head>, ChunkBody) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        let sink = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head: Some(head_tx),
            body: body_tx,
            upgrade,
        };
        (sink, head_rx, ChunkBody { rx: body_rx })
    }

    fn head_sent(&self) -> bool {
        self.head.is_none()
    }

    fn send_head(&mut self) -> Result<(), Error> {
        if let Some(tx) = self.head.take() {
            let head = Head { status: self.status, headers: std::mem::take(&mut self.headers) };
            tx.send(head)
                .map_err(|_| Error::write_failure("client went away before the response head"))?;
        }
        Ok(())
    }
}

impl ResponseWriter for StreamingSink {
    fn set_status(&mut self, status: StatusCode) {
        if self.head_sent() {
            warn!(%status, sent = %self.status, "superfluous status: response head already sent");
            return;
        }
        self.status = status;
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, Error> {
        self.send_head()?;
        if !chunk.is_empty() {
            self.body
                .send(Bytes::copy_from_slice(chunk))
                .map_err(|_| Error::write_failure("client went away mid-body"))?;
        }
        Ok(chunk.len())
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.upgrade.is_some() { Some(self) } else { None }
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }
}

impl Hijacker for StreamingSink {
    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        self.upgrade.take().ok_or(Error::CapabilityUnsupported(Capability::Hijack))
    }
}

impl Flusher for StreamingSink {
    /// Chunks already stream as they are written, so flushing only has to
    /// commit the head.
    fn flush(&mut self) -> Result<(), Error> {
        self.send_head()
    }
}

impl Drop for StreamingSink {
    fn drop(&mut self) {
        if let Err(e) = self.send_head() {
            debug!(error = %e, "response head dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use http::header::{CONTENT_TYPE, HeaderValue};
    use http_body_util::BodyExt;

    use super::*;
    use crate::writer;

    #[tokio::test]
    async fn first_write_commits_the_head() {
        let (mut sink, mut head_rx, body) = StreamingSink::channel(None);
        sink.set_status(StatusCode::CREATED);
        sink.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(head_rx.try_recv().is_err());

        sink.write(b"hello ").unwrap();
        sink.write(b"world").unwrap();
        let head = head_rx.try_recv().unwrap();
        assert_eq!(head.status, StatusCode::CREATED);
        assert_eq!(head.headers[CONTENT_TYPE], "text/plain");

        drop(sink);
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn status_after_the_head_is_ignored() {
        let (mut sink, head_rx, _body) = StreamingSink::channel(None);
        sink.write(b"x").unwrap();
        sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        drop(sink);

        assert_eq!(head_rx.await.unwrap().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn dropping_an_untouched_sink_sends_the_default_head() {
        let (sink, head_rx, body) = StreamingSink::channel(None);
        drop(sink);

        assert_eq!(head_rx.await.unwrap().status, StatusCode::OK);
        assert!(body.collect().await.unwrap().to_bytes().is_empty());
    }

    #[tokio::test]
    async fn flush_commits_the_head_without_a_body() {
        let (mut sink, mut head_rx, _body) = StreamingSink::channel(None);
        sink.set_status(StatusCode::ACCEPTED);
        writer::flush(&mut sink).unwrap();

        assert_eq!(head_rx.try_recv().unwrap().status, StatusCode::ACCEPTED);
    }

    #[test]
    fn write_fails_once_the_client_is_gone() {
        let (mut sink, head_rx, body) = StreamingSink::channel(None);
        drop(head_rx);
        drop(body);

        let err = sink.write(b"lost").unwrap_err();
        assert!(matches!(err, Error::WriteFailure(_)));
    }

    #[test]
    fn body_failure_after_the_head_is_reported() {
        let (mut sink, _head_rx, body) = StreamingSink::channel(None);
        drop(body);

        assert!(matches!(sink.write(b"lost"), Err(Error::WriteFailure(_))));
    }

    #[test]
    fn hijack_needs_an_upgrade_handle() {
        let (mut sink, _head_rx, _body) = StreamingSink::channel(None);
        assert!(matches!(
            writer::hijack(&mut sink),
            Err(Error::CapabilityUnsupported(Capability::Hijack)),
        ));

        let upgrade = hyper::upgrade::on(http::Request::new(()));
        let (mut sink, _head_rx, _body) = StreamingSink::channel(Some(upgrade));
        assert!(writer::hijack(&mut sink).is_ok());
        // The handle is single-use.
        assert!(writer::hijack(&mut sink).is_err());
    }
}
