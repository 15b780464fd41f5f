//! # mend
//!
//! HTTP middleware that turns a panicking handler into one clean `500`,
//! never a half-written response.
//!
//! ## The contract
//!
//! A handler writes its response through a [`ResponseWriter`]. Behind that
//! trait the middleware hands it a *buffer*, not the connection:
//!
//! - If the handler returns, the buffer (status, headers, body) is committed
//!   to the client in the order it was written.
//! - If the handler panics, before its first write or after its tenth, the
//!   buffer is thrown away and the client gets a fixed error page instead.
//!   The panic is logged with its message, location and stack trace, and the
//!   worker that ran the handler carries on serving.
//!
//! What the error page contains is set once at startup by [`Policy`]:
//! `dev_mode` shows the panic and trace, production mode shows
//! `Something went wrong...`.
//!
//! Only unwinding panics are recoverable. Aborts, stack overflows and
//! `panic = "abort"` builds take the process down as usual.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mend::{BoxFuture, Policy, Recovery, Request, ResponseWriter, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/reports/", report)
//!         .route("/", index);
//!
//!     let recovery = Recovery::new(app, Policy::default());
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(recovery).await.unwrap();
//! }
//!
//! fn report(req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let _ = w.write(b"<h1>Report</h1>");
//!         // A panic here still produces a clean 500: the heading above
//!         // never reaches the client.
//!         let id: u32 = req.path().trim_start_matches("/reports/").parse().unwrap();
//!         let _ = w.write(format!("<p>#{id}</p>").as_bytes());
//!     })
//! }
//!
//! fn index(_req: Request, w: &mut dyn ResponseWriter) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let _ = w.write(b"ok");
//!     })
//! }
//! ```

mod error;
mod fault;
mod handler;
mod request;
mod router;
mod server;
mod sink;
#[cfg(test)]
mod testing;

pub mod config;
pub mod demo;
pub mod middleware;
pub mod writer;

pub use error::{Capability, Error};
pub use fault::Fault;
pub use handler::{BoxFuture, Handler};
pub use middleware::{Outcome, Policy, Recovery};
pub use request::Request;
pub use router::Router;
pub use server::Server;
pub use writer::{ContentType, ResponseWriter};
