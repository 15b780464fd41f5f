//! Panic recovery.
//!
//! [`Recovery`] runs one handler per request inside a recovery boundary and
//! resolves it into exactly one response:
//!
//! ```text
//!   Idle ─► Dispatched ─► Buffering ─┬─ handler returned ─► Committed
//!                                    └─ handler panicked ─► Recovered
//! ```
//!
//! With buffering on, a panic at any point (before the first write, between
//! writes, after setting a status) leaves the client untouched: the buffer
//! is thrown away and a fixed `500` is written to the real sink instead.
//!
//! With buffering off, the handler writes straight through. A panic after
//! the first write can then only append the error body to what was already
//! sent; the `500` status arrives too late and is dropped by the sink.

use http::header::{HeaderValue, X_CONTENT_TYPE_OPTIONS};
use http::StatusCode;
use tracing::{debug, error};

use crate::error::Error;
use crate::fault::{self, Fault};
use crate::middleware::buffer::BufferedWriter;
use crate::request::Request;
use crate::router::Router;
use crate::writer::{ContentType, ResponseWriter};

/// Body of the production error page.
pub const GENERIC_ERROR_BODY: &str = "Something went wrong...";

/// How [`Recovery`] treats handler output and faults. Fixed at startup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Policy {
    /// Put the panic message and stack trace in the 500 page.
    pub dev_mode: bool,
    /// Hold all handler output until the handler returns.
    pub buffer_responses: bool,
}

impl Policy {
    pub fn dev_mode(mut self, on: bool) -> Self {
        self.dev_mode = on;
        self
    }

    pub fn buffer_responses(mut self, on: bool) -> Self {
        self.buffer_responses = on;
        self
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self { dev_mode: false, buffer_responses: true }
    }
}

/// How a request ended.
#[derive(Debug)]
pub enum Outcome {
    /// The handler returned and its output reached the real sink.
    Committed,
    /// The handler panicked; the error page was written instead.
    Recovered(Fault),
}

/// The recovery middleware: a router plus the policy applied to every
/// request it dispatches.
pub struct Recovery {
    router: Router,
    policy: Policy,
}

impl Recovery {
    pub fn new(router: Router, policy: Policy) -> Self {
        Self { router, policy }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Dispatches `req` and writes its response to `sink`.
    ///
    /// A handler panic never escapes this call. The only errors returned are
    /// [`Error::WriteFailure`]s from `sink`, after which the response is
    /// abandoned.
    pub async fn handle(&self, req: Request, sink: &mut dyn ResponseWriter) -> Result<Outcome, Error> {
        let handler = self.router.resolve(req.path());

        if !self.policy.buffer_responses {
            return match fault::catch(handler.call(req, sink)).await {
                Ok(()) => Ok(Outcome::Committed),
                Err(fault) => self.recover(sink, fault),
            };
        }

        let mut buffered = BufferedWriter::new(sink);
        let result = fault::catch(handler.call(req, &mut buffered)).await;
        match result {
            Ok(()) => {
                let written = buffered.commit()?;
                debug!(bytes = written, "response committed");
                Ok(Outcome::Committed)
            }
            Err(fault) => {
                let dropped = buffered.discard();
                debug!(bytes = dropped, "buffered response discarded");
                self.recover(sink, fault)
            }
        }
    }

    /// Writes the error page for `fault` straight to the real sink.
    fn recover(&self, sink: &mut dyn ResponseWriter, fault: Fault) -> Result<Outcome, Error> {
        error!(
            fault = %fault.message(),
            location = fault.location().unwrap_or("<unknown>"),
            backtrace = %fault.backtrace(),
            "handler panicked; sending 500"
        );

        let body = if self.policy.dev_mode {
            sink.set_content_type(ContentType::Html);
            fault.to_html()
        } else {
            sink.set_content_type(ContentType::Text);
            sink.headers_mut()
                .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
            GENERIC_ERROR_BODY.to_owned()
        };
        sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        sink.write(body.as_bytes())?;

        Ok(Outcome::Recovered(fault))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::header::CONTENT_TYPE;

    use super::*;
    use crate::handler::BoxFuture;
    use crate::testing::RecordingSink;

    fn panics_first(_req: Request, _w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
        Box::pin(async move {
            explode();
        })
    }

    fn panics_midway(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
        Box::pin(async move {
            w.set_status(StatusCode::ACCEPTED);
            w.headers_mut().insert("x-partial", HeaderValue::from_static("yes"));
            let _ = w.write(b"<h1>Hello!</h1>");
            tokio::task::yield_now().await;
            explode();
        })
    }

    fn created(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
        Box::pin(async move {
            w.set_status(StatusCode::OK);
            let _ = w.write(b"a");
            tokio::task::yield_now().await;
            let _ = w.write(b"b");
            w.set_status(StatusCode::CREATED);
            let _ = w.write(b"c");
        })
    }

    fn silent(_req: Request, _w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
        Box::pin(async {})
    }

    fn explode() {
        panic!("Oh no!");
    }

    fn recovery(policy: Policy) -> Recovery {
        let router = Router::new()
            .route("/panic/", panics_first)
            .route("/panic-after/", panics_midway)
            .route("/created", created)
            .route("/silent", silent);
        Recovery::new(router, policy)
    }

    fn get(path: &str) -> Request {
        Request::from(http::Request::get(path).body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn panic_before_any_write_yields_the_generic_page() {
        let mut sink = RecordingSink::new();
        let outcome = recovery(Policy::default()).handle(get("/panic/"), &mut sink).await.unwrap();

        let Outcome::Recovered(fault) = outcome else { panic!("expected recovery") };
        assert_eq!(fault.message(), "Oh no!");
        assert_eq!(sink.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(sink.body(), GENERIC_ERROR_BODY);
        assert_eq!(sink.chunks.len(), 1);
        assert_eq!(sink.headers[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(sink.headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn panic_after_writes_discards_everything_buffered() {
        let mut sink = RecordingSink::new();
        let outcome = recovery(Policy::default())
            .handle(get("/panic-after/"), &mut sink)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Recovered(_)));
        assert_eq!(sink.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(sink.body(), GENERIC_ERROR_BODY);
        assert!(sink.headers.get("x-partial").is_none());
    }

    #[tokio::test]
    async fn dev_mode_shows_the_fault_and_trace() {
        let mut sink = RecordingSink::new();
        recovery(Policy::default().dev_mode(true))
            .handle(get("/panic-after/"), &mut sink)
            .await
            .unwrap();

        let body = sink.body();
        assert_eq!(sink.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(body.starts_with("<h1>panic: Oh no!</h1><pre>"), "{body}");
        assert!(body.ends_with("</pre>"));
        assert!(!body.contains("<h1>Hello!</h1>"));
        assert_eq!(sink.headers[CONTENT_TYPE], "text/html; charset=utf-8");
    }

    #[tokio::test]
    async fn normal_return_commits_in_order_with_the_last_status() {
        let mut sink = RecordingSink::new();
        let outcome = recovery(Policy::default()).handle(get("/created"), &mut sink).await.unwrap();

        assert!(matches!(outcome, Outcome::Committed));
        assert_eq!(sink.status, Some(StatusCode::CREATED));
        assert_eq!(sink.body(), "abc");
    }

    #[tokio::test]
    async fn silent_handler_leaves_the_sink_default() {
        let mut sink = RecordingSink::new();
        recovery(Policy::default()).handle(get("/silent"), &mut sink).await.unwrap();

        assert_eq!(sink.status, None);
        assert_eq!(sink.status_or_default(), StatusCode::OK);
        assert!(sink.chunks.is_empty());
    }

    #[tokio::test]
    async fn pass_through_mode_appends_the_error_to_what_was_sent() {
        let mut sink = RecordingSink::new();
        let outcome = recovery(Policy::default().buffer_responses(false))
            .handle(get("/panic-after/"), &mut sink)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Recovered(_)));
        assert_eq!(sink.status, Some(StatusCode::ACCEPTED));
        assert_eq!(sink.body(), format!("<h1>Hello!</h1>{GENERIC_ERROR_BODY}"));
    }

    #[tokio::test]
    async fn pass_through_mode_before_any_write_is_still_clean() {
        let mut sink = RecordingSink::new();
        recovery(Policy::default().buffer_responses(false))
            .handle(get("/panic/"), &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(sink.body(), GENERIC_ERROR_BODY);
    }

    #[tokio::test]
    async fn commit_failure_is_reported_not_retried() {
        let mut sink = RecordingSink::new().failing_after(1);
        let err = recovery(Policy::default())
            .handle(get("/created"), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WriteFailure(_)));
        assert_eq!(sink.body(), "a");
    }

    #[tokio::test]
    async fn error_page_failure_is_reported() {
        let mut sink = RecordingSink::new().failing_after(0);
        let err = recovery(Policy::default())
            .handle(get("/panic/"), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WriteFailure(_)));
    }

    #[tokio::test]
    async fn repeated_faults_do_not_poison_later_requests() {
        let rec = recovery(Policy::default());
        for _ in 0..5 {
            let mut sink = RecordingSink::new();
            rec.handle(get("/panic/"), &mut sink).await.unwrap();
            assert_eq!(sink.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        }

        let mut sink = RecordingSink::new();
        let outcome = rec.handle(get("/created"), &mut sink).await.unwrap();
        assert!(matches!(outcome, Outcome::Committed));
        assert_eq!(sink.body(), "abc");
    }
}
