//! Panic interception for handler futures.
//!
//! [`catch`] drives a future and turns a panic raised while polling it into
//! a [`Fault`]. The future is wrapped so that every poll runs inside a
//! `Scope` guard marking the current thread as "inside a recovery boundary",
//! and the wrapper is driven through [`FutureExt::catch_unwind`].
//!
//! The unwind payload alone is not enough to diagnose anything: by the time
//! `catch_unwind` returns, the stack it came from is gone. So a panic hook is
//! installed once per process. When it fires inside a boundary it records
//! the panic location and a backtrace in a thread-local slot, which `catch`
//! picks up in the same `poll`. The slot is cleared whenever a boundary is
//! entered, so a panic the handler caught itself never leaks its trace into
//! a later fault. Panics outside any boundary go to whatever hook was
//! installed before.
//!
//! Only unwinding panics can be caught. Builds with `panic = "abort"`, stack
//! overflows and other process-level failures are out of reach.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use futures::FutureExt;
use tracing::debug;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static TRACE: RefCell<Option<Trace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

struct Trace {
    location: Option<String>,
    backtrace: String,
}

/// A panic recovered from a handler.
#[derive(Clone, Debug)]
pub struct Fault {
    message: String,
    location: Option<String>,
    backtrace: String,
}

impl Fault {
    fn capture(payload: Box<dyn Any + Send>) -> Self {
        let message = payload_message(&*payload).to_owned();

        // Missing when someone replaced our hook after it was installed. The
        // recovery site's own stack is the best we can offer then.
        let trace = TRACE.with(|slot| slot.borrow_mut().take());
        let (location, backtrace) = match trace {
            Some(t) => (t.location, t.backtrace),
            None => (None, Backtrace::force_capture().to_string()),
        };

        Self { message, location, backtrace }
    }

    /// The panic payload rendered as text (`"Box<dyn Any>"` for payloads
    /// that are neither `&str` nor `String`).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `file:line:col` of the `panic!`, when known.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }

    /// Developer-facing error page: `<h1>panic: {message}</h1><pre>{trace}</pre>`.
    pub fn to_html(&self) -> String {
        format!(
            "<h1>panic: {}</h1><pre>{}</pre>",
            escape_html(&self.message),
            escape_html(&self.backtrace),
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// Polls `fut` to completion, converting a panic into `Err(Fault)`.
///
/// The future is never polled again after it panicked.
pub async fn catch<F>(fut: F) -> Result<F::Output, Fault>
where
    F: Future + Unpin,
{
    install_hook();

    match AssertUnwindSafe(Scoped(fut)).catch_unwind().await {
        Ok(out) => {
            // Left behind by a panic the future recovered from on its own.
            TRACE.with(|slot| slot.borrow_mut().take());
            Ok(out)
        }
        Err(payload) => Err(Fault::capture(payload)),
    }
}

/// Polls the inner future inside a [`Scope`].
struct Scoped<F>(F);

impl<F: Future + Unpin> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let _scope = Scope::enter();
        Pin::new(&mut self.0).poll(cx)
    }
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let location = info.location().map(ToString::to_string);
            debug!(
                panic = payload_message(info.payload()),
                location = location.as_deref().unwrap_or("<unknown>"),
                "panic inside a recovery boundary"
            );
            let trace = Trace { location, backtrace: Backtrace::force_capture().to_string() };
            TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
        }));
    });
}

/// Marks the current thread as inside a recovery boundary until dropped.
struct Scope;

impl Scope {
    fn enter() -> Self {
        let outer = DEPTH.with(|d| d.replace(d.get() + 1));
        if outer == 0 {
            TRACE.with(|slot| slot.borrow_mut().take());
        }
        Scope
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get() - 1));
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
