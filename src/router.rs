//! Path-prefix request router.
//!
//! Two kinds of pattern, the classic mux rules:
//!
//! - `/healthz` matches that exact path and nothing else.
//! - `/static/` ends in a slash and matches the whole subtree below it
//!   (`/static/`, `/static/css/site.css`, ...). `/` is therefore the
//!   catch-all.
//!
//! When several subtrees match, the longest pattern wins. A request for
//! `/static` when only `/static/` is registered is redirected there with
//! `301 Moved Permanently`. Routes are method-agnostic; handlers look at
//! [`Request::method`] themselves if they care.

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{HeaderValue, LOCATION};
use http::StatusCode;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::writer::{ContentType, ResponseWriter};

/// The application router.
///
/// Build it once at startup; it is read-only afterwards and shared by every
/// request. Each [`Router::route`] call returns `self` so registrations chain.
pub struct Router {
    exact: HashMap<String, BoxedHandler>,
    /// Subtree patterns, longest first.
    subtrees: Vec<(String, BoxedHandler)>,
}

impl Router {
    pub fn new() -> Self {
        Self { exact: HashMap::new(), subtrees: Vec::new() }
    }

    /// Registers `handler` for `pattern`. Returns `self` for chaining.
    ///
    /// ```rust
    /// # use mend::{BoxFuture, Request, ResponseWriter, Router};
    /// # fn index(_: Request, _: &mut dyn ResponseWriter) -> BoxFuture<'_> { Box::pin(async {}) }
    /// # fn assets(_: Request, _: &mut dyn ResponseWriter) -> BoxFuture<'_> { Box::pin(async {}) }
    /// Router::new()
    ///     .route("/static/", assets)
    ///     .route("/",        index);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `pattern` does not start with `/` or is already registered.
    pub fn route(mut self, pattern: &str, handler: impl Handler) -> Self {
        if !pattern.starts_with('/') {
            panic!("invalid route `{pattern}`: patterns must start with `/`");
        }
        let handler = handler.into_boxed_handler();

        if pattern.ends_with('/') {
            if self.subtrees.iter().any(|(p, _)| p == pattern) {
                panic!("invalid route `{pattern}`: already registered");
            }
            self.subtrees.push((pattern.to_owned(), handler));
            self.subtrees.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        } else if self.exact.insert(pattern.to_owned(), handler).is_some() {
            panic!("invalid route `{pattern}`: already registered");
        }
        self
    }

    /// Picks the handler for `path`. Always returns one: unmatched paths get
    /// the built-in redirect or 404 handlers.
    pub(crate) fn resolve(&self, path: &str) -> BoxedHandler {
        if let Some(handler) = self.exact.get(path) {
            return Arc::clone(handler);
        }
        if self.wants_slash(path) {
            return redirect_to_slash.into_boxed_handler();
        }
        self.subtrees
            .iter()
            .find(|(pattern, _)| path.starts_with(pattern.as_str()))
            .map(|(_, handler)| Arc::clone(handler))
            .unwrap_or_else(|| not_found.into_boxed_handler())
    }

    fn wants_slash(&self, path: &str) -> bool {
        !path.ends_with('/')
            && self
                .subtrees
                .iter()
                .any(|(pattern, _)| pattern.len() == path.len() + 1 && pattern.starts_with(path))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn redirect_to_slash(req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
    Box::pin(async move {
        let location = match req.query() {
            Some(q) => format!("{}/?{q}", req.path()),
            None => format!("{}/", req.path()),
        };
        // Built from a path hyper already parsed, so it is valid header text.
        if let Ok(value) = HeaderValue::from_str(&location) {
            w.headers_mut().insert(LOCATION, value);
        }
        w.set_status(StatusCode::MOVED_PERMANENTLY);
    })
}

fn not_found(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
    Box::pin(async move {
        w.set_content_type(ContentType::Text);
        w.set_status(StatusCode::NOT_FOUND);
        let _ = w.write(b"404 page not found");
    })
}
