//! Unified error type.

use std::fmt;
use std::io;

use thiserror::Error;

/// An optional sink feature a handler can ask for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capability {
    /// Take over the underlying connection (HTTP/1.1 upgrade).
    Hijack,
    /// Push the response head and any written bytes out immediately.
    Flush,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hijack => "hijack",
            Self::Flush => "flush",
        })
    }
}

/// The error type returned by mend's fallible operations.
///
/// A panicking handler is *not* an `Error`: the recovery middleware absorbs
/// it and reports it as [`Outcome::Recovered`](crate::middleware::Outcome).
/// This type covers infrastructure failures (binding, accepting), capability
/// requests a sink cannot honour, and bytes that could not reach the client.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Binding to a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// The underlying sink does not offer the requested capability.
    #[error("response sink does not support {0}")]
    CapabilityUnsupported(Capability),

    /// The head or a body chunk could not be delivered, usually because the
    /// peer went away. The rest of the response is abandoned.
    #[error("response write failed: {0}")]
    WriteFailure(#[source] io::Error),
}

impl Error {
    pub(crate) fn write_failure(reason: &'static str) -> Self {
        Self::WriteFailure(io::Error::new(io::ErrorKind::BrokenPipe, reason))
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// ```
    /// use mend::{Capability, Error};
    ///
    /// let err = Error::CapabilityUnsupported(Capability::Hijack);
    /// assert_eq!(err.as_label(), "capability_unsupported");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::CapabilityUnsupported(_) => "capability_unsupported",
            Self::WriteFailure(_) => "write_failure",
        }
    }
}
