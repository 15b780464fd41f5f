//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one table, so each one
//! is wrapped in a trait object (`dyn ErasedHandler`) and stored uniformly.
//!
//! ```text
//! fn hello(req, w) -> BoxFuture<'_> { … }   ← user writes this
//!        ↓ router.route("/", hello)
//! hello.into_boxed_handler()               ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))               ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, w)  at request time    ← one vtable dispatch
//! ```
//!
//! # Why handlers return `BoxFuture<'_>`
//!
//! A handler borrows its writer for as long as it runs: the writer is owned
//! by the recovery middleware, which needs it back afterwards to commit or
//! to write the error page. An `async fn` cannot express a future tied to
//! the lifetime of a `&mut dyn` argument in a way a blanket impl can name, so
//! handlers box their future explicitly:
//!
//! ```rust
//! use mend::{BoxFuture, Request, ResponseWriter};
//!
//! fn hello(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let _ = w.write(b"hello");
//!     })
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::writer::ResponseWriter;

/// A heap-allocated, type-erased handler future borrowing its writer for `'a`.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function with
/// the signature:
///
/// ```text
/// fn name(req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_>
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F> private::Sealed for F
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a> + Send + Sync + 'static,
{
}

impl<F> Handler for F
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete handler `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F> ErasedHandler for FnHandler<F>
where
    F: for<'a> Fn(Request, &'a mut dyn ResponseWriter) -> BoxFuture<'a> + Send + Sync,
{
    fn call<'a>(&'a self, req: Request, w: &'a mut dyn ResponseWriter) -> BoxFuture<'a> {
        (self.0)(req, w)
    }
}
