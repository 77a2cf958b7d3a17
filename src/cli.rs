//! Command line interface for the `busbridge` binary.
//!
//! Shared with `build.rs`, which renders the man page from it, so this file
//! depends on nothing but `clap` and `std`.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `busbridge` binary.
#[derive(Debug, Parser)]
#[command(
    name = "busbridge",
    version,
    about = "Request/reply bridge between a local bus and a queue broker"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a standalone queue broker.
    Broker(BrokerArgs),
    /// Append a password seal to a PEM store.
    Seal(SealArgs),
    /// Validate a bridge configuration and its credentials.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct BrokerArgs {
    /// Address to accept connections on.
    #[arg(long, default_value = "127.0.0.1:61616")]
    pub listen: SocketAddr,
    /// PEM store holding the server certificate chain and key; enables TLS.
    #[arg(long)]
    pub key_store: Option<PathBuf>,
    #[arg(long, requires = "key_store", env = "BUSBRIDGE_KEY_STORE_PASSWORD")]
    pub key_store_password: Option<String>,
    /// PEM store of CAs trusted for client certificates; requires clients to
    /// authenticate.
    #[arg(long, requires = "key_store")]
    pub client_trust_store: Option<PathBuf>,
    #[arg(
        long,
        requires = "client_trust_store",
        env = "BUSBRIDGE_CLIENT_TRUST_STORE_PASSWORD"
    )]
    pub client_trust_store_password: Option<String>,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub struct SealArgs {
    /// PEM store to seal.
    pub input: PathBuf,
    /// Password the seal is keyed with.
    #[arg(long, env = "BUSBRIDGE_STORE_PASSWORD")]
    pub password: String,
    /// Where to write the sealed store; defaults to overwriting the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Bridge configuration file (TOML).
    pub config: PathBuf,
    /// Also open a connection to the configured broker.
    #[arg(long)]
    pub connect: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_broker_defaults() {
        let cli = Cli::parse_from(["busbridge", "broker"]);
        let Command::Broker(args) = cli.command else {
            panic!("expected the broker subcommand");
        };
        assert_eq!(args.listen.port(), 61616);
        assert!(args.key_store.is_none());
    }

    #[test]
    fn client_trust_requires_key_store() {
        let result = Cli::try_parse_from([
            "busbridge",
            "broker",
            "--client-trust-store",
            "ca.pem",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_seal() {
        let cli = Cli::parse_from(["busbridge", "seal", "trust.pem", "--password", "changeit"]);
        let Command::Seal(args) = cli.command else {
            panic!("expected the seal subcommand");
        };
        assert_eq!(args.password, "changeit");
        assert!(args.output.is_none());
    }
}
