//! Process configuration.
//!
//! Every flag can also come from the environment, which is how the binary
//! is usually configured in a container:
//!
//! ```text
//! mend --dev                 # show panic details in 500 pages
//! MEND_ADDR=127.0.0.1:8080 mend
//! ```

use std::net::SocketAddr;

use clap::Parser;

use crate::middleware::Policy;

/// Command-line arguments of the `mend` binary.
#[derive(Debug, Parser)]
#[command(name = "mend", version, about = "Demo server for panic-recovering HTTP middleware")]
pub struct Args {
    /// Include the panic message and stack trace in 500 responses.
    #[arg(long, env = "MEND_DEV")]
    pub dev: bool,

    /// Address to listen on.
    #[arg(long, env = "MEND_ADDR", default_value = "0.0.0.0:3000")]
    pub addr: SocketAddr,

    /// Stream handler output as it is written instead of buffering it until
    /// the handler returns. A late panic can then leave a partial body.
    #[arg(long, env = "MEND_UNBUFFERED")]
    pub unbuffered: bool,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    pub log: String,
}

impl Args {
    pub fn policy(&self) -> Policy {
        Policy::default()
            .dev_mode(self.dev)
            .buffer_responses(!self.unbuffered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_production_and_buffered() {
        let args = Args::try_parse_from(["mend"]).unwrap();
        assert_eq!(args.addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(args.log, "info");
        assert_eq!(args.policy(), Policy { dev_mode: false, buffer_responses: true });
    }

    #[test]
    fn flags_map_onto_the_policy() {
        let args = Args::try_parse_from(["mend", "--dev", "--unbuffered", "--addr", "127.0.0.1:8080"])
            .unwrap();
        assert_eq!(args.addr.port(), 8080);
        assert_eq!(args.policy(), Policy { dev_mode: true, buffer_responses: false });
    }

    #[test]
    fn bad_address_is_rejected() {
        assert!(Args::try_parse_from(["mend", "--addr", "not-an-addr"]).is_err());
    }
}
