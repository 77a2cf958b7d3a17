//! `busbridge` command line tool.
//!
//! Runs a standalone broker, seals credential stores and checks bridge
//! configurations.

mod cli;

use std::{error::Error, fs, future::Future, io};

use busbridge::{
    BridgeConfig,
    broker::{BrokerClient, BrokerServer},
    tls::{StoreSettings, TlsContextBuilder, seal_store, server_config},
    transport::TransportSelector,
};
use clap::Parser;
use cli::{BrokerArgs, CheckArgs, Cli, Command, SealArgs};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type CliResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> CliResult {
    // Applications embedding the library install their own subscriber.
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::Broker(args) => run_broker(args).await,
        Command::Seal(args) => seal(&args),
        Command::Check(args) => check(&args).await,
    }
}

fn store(path: &std::path::Path, password: Option<&str>) -> StoreSettings {
    let settings = StoreSettings::new(path.to_path_buf());
    match password {
        Some(password) => settings.password(password),
        None => settings,
    }
}

async fn run_broker(args: BrokerArgs) -> CliResult {
    if let Some(addr) = args.metrics {
        install_metrics(addr)?;
    }
    let mut server = BrokerServer::bind(args.listen).await?;
    if let Some(key_store) = &args.key_store {
        let identity = store(key_store, args.key_store_password.as_deref());
        let client_trust = args
            .client_trust_store
            .as_deref()
            .map(|path| store(path, args.client_trust_store_password.as_deref()));
        server = server.with_tls(server_config(&identity, client_trust.as_ref())?);
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));
    server.run(shutdown).await;
    Ok(())
}

/// Cancel `shutdown` once `signal` fires. If the signal cannot be watched the
/// broker keeps running.
async fn cancel_on_signal(signal: impl Future<Output = io::Result<()>>, shutdown: CancellationToken) {
    match signal.await {
        Ok(()) => {
            info!("shutdown requested");
            shutdown.cancel();
        }
        Err(e) => warn!(error = %e, "cannot listen for ctrl-c; stop the broker another way"),
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> CliResult {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "serving metrics");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) -> CliResult {
    warn!(%addr, "built without the metrics feature; not serving metrics");
    Ok(())
}

fn seal(args: &SealArgs) -> CliResult {
    let pem = fs::read(&args.input)?;
    let sealed = seal_store(&pem, &args.password);
    let output = args.output.as_ref().unwrap_or(&args.input);
    fs::write(output, sealed)?;
    println!("sealed {}", output.display());
    Ok(())
}

async fn check(args: &CheckArgs) -> CliResult {
    let config = BridgeConfig::from_path(&args.config)?;
    let uri = config.broker_uri()?;
    println!("broker: {uri}");
    for route in config.routes()? {
        println!("route: {route}");
    }
    let selector = match config.tls_settings() {
        Some(settings) => {
            let context = TlsContextBuilder::new(settings.clone()).build()?;
            println!(
                "tls: {} trust anchor(s), client certificate: {}",
                context.trust_anchor_count(),
                if context.presents_client_certificate() { "yes" } else { "no" }
            );
            TransportSelector::with_tls(settings, config.connect_options())
        }
        None => TransportSelector::plain_only(config.connect_options()),
    };
    if args.connect {
        match BrokerClient::connect(&uri, &selector).await {
            Ok(client) => {
                client.close().await;
                println!("connection: ok");
            }
            Err(e) => {
                warn!(error = %e, "broker connection failed");
                return Err(e.into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_cancels_shutdown() {
        let shutdown = CancellationToken::new();
        cancel_on_signal(async { Ok(()) }, shutdown.clone()).await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn unwatchable_signal_keeps_running() {
        let shutdown = CancellationToken::new();
        let signal = async { Err(io::Error::other("no signal handler")) };
        cancel_on_signal(signal, shutdown.clone()).await;
        assert!(!shutdown.is_cancelled());
    }
}
