//! HTTP server and graceful shutdown.
//!
//! # Request lifecycle
//!
//! Each request gets its own worker task. The service future hyper polls
//! only waits for the response *head*; the worker runs [`Recovery`] against
//! a streaming sink and feeds the body afterwards:
//!
//! ```text
//!   hyper ─► dispatch ─┬─ spawn worker: Recovery::handle(req, &mut sink)
//!                      └─ await head ─► Response<ChunkBody> ─► client
//! ```
//!
//! A panicking handler is contained inside the worker, so neither the
//! connection task nor the accept loop ever sees it.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** (what Kubernetes sends first) or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::middleware::{Outcome, Recovery};
use crate::request::Request;
use crate::sink::{ChunkBody, StreamingSink};

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    listener: Option<TcpListener>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use mend::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr, listener: None }
    }

    /// Serves on an already-bound listener, e.g. one bound to port `0`.
    pub fn from_listener(listener: TcpListener) -> Result<Self, Error> {
        let addr = listener.local_addr()?;
        Ok(Self { addr, listener: Some(listener) })
    }

    /// The address the server is (or will be) listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts connections until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, recovery: Recovery) -> Result<(), Error> {
        self.serve_with_shutdown(recovery, shutdown_signal()).await
    }

    /// Accepts connections until `signal` resolves, then drains.
    pub async fn serve_with_shutdown<S>(self, recovery: Recovery, signal: S) -> Result<(), Error>
    where
        S: Future<Output = ()>,
    {
        let listener = match self.listener {
            Some(listener) => listener,
            None => TcpListener::bind(self.addr).await?,
        };
        let addr = listener.local_addr()?;

        // Routing table and policy are read-only from here on; every
        // connection and request shares them through the Arc.
        let recovery = Arc::new(recovery);
        let policy = recovery.policy();

        info!(%addr, dev_mode = policy.dev_mode, buffered = policy.buffer_responses, "mend listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let recovery = Arc::clone(&recovery);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let recovery = Arc::clone(&recovery);
                            async move { dispatch(recovery, req, remote_addr).await }
                        });

                        // HTTP/1.1 and HTTP/2, whatever the client negotiates.
                        // Upgrades stay enabled so handlers can hijack.
                        let builder = ConnBuilder::new(TokioExecutor::new());
                        if let Err(e) = builder.serve_connection_with_upgrades(io, svc).await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("mend stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the recovery middleware on its own worker task
/// and answers hyper with the head the worker commits.
///
/// Infallible towards hyper: every failure becomes a status code.
async fn dispatch(
    recovery: Arc<Recovery>,
    mut req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<ChunkBody>, Infallible> {
    let upgrade = req.extensions_mut().remove::<OnUpgrade>();
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(bare(StatusCode::BAD_REQUEST));
        }
    };
    let request = Request::new(parts, body);
    let method = request.method().clone();
    let path = request.path().to_owned();

    let (mut sink, head_rx, body) = StreamingSink::channel(upgrade);

    tokio::spawn(async move {
        match recovery.handle(request, &mut sink).await {
            Ok(Outcome::Committed) => {
                debug!(%method, %path, peer = %remote_addr, "request committed");
            }
            Ok(Outcome::Recovered(fault)) => {
                info!(%method, %path, peer = %remote_addr, %fault, "request recovered");
            }
            Err(e) => {
                warn!(%method, %path, peer = %remote_addr, error = %e, label = e.as_label(), "response abandoned");
            }
        }
        // Dropping the sink commits a head if none went out yet and ends
        // the body stream.
    });

    match head_rx.await {
        Ok(head) => Ok(head.into_response(body)),
        Err(_) => {
            error!(peer = %remote_addr, "worker exited without a response head");
            Ok(bare(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn bare(status: StatusCode) -> http::Response<ChunkBody> {
    let mut res = http::Response::new(ChunkBody::empty());
    *res.status_mut() = status;
    res
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
