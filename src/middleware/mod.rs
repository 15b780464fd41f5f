//! Middleware layer.
//!
//! Two pieces, used together by [`Recovery`]:
//!
//! - [`buffer`]: a [`ResponseWriter`](crate::ResponseWriter) that holds a
//!   handler's output until it is explicitly committed or discarded.
//! - [`recover`]: the recovery boundary. It runs the handler against the
//!   buffer, commits on success and swaps in a `500` page on panic.

pub mod buffer;
pub mod recover;

pub use buffer::BufferedWriter;
pub use recover::{GENERIC_ERROR_BODY, Outcome, Policy, Recovery};
