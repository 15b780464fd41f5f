//! Demo server: the three recovery endpoints behind the middleware.
//!
//! Run with:
//!   cargo run -- --dev
//!
//! Try:
//!   curl -i http://localhost:3000/
//!   curl -i http://localhost:3000/panic/
//!   curl -i http://localhost:3000/panic-after/

use std::process::ExitCode;

use clap::Parser;
use mend::config::Args;
use mend::{Recovery, Server, demo};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let recovery = Recovery::new(demo::router(), args.policy());

    match Server::bind(args.addr).serve(recovery).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}
