#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! HTTP server bridging a browser mail client to IMAP/SMTP accounts

use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use webmail_bridge::{Bridge, BridgeConfig, ImapConnector, SmtpDispatcher, http};

#[derive(Parser)]
#[command(name = "webmail-bridge")]
#[command(about = "Serve the webmail session bridge over HTTP")]
struct Args {
    /// Address to listen on (overrides BRIDGE_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Accept self-signed IMAP certificates (overrides ACCEPT_INVALID_CERTS)
    #[arg(long)]
    accept_invalid_certs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = BridgeConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.accept_invalid_certs |= args.accept_invalid_certs;

    let connector = ImapConnector::new(config.accept_invalid_certs);
    let dispatcher = SmtpDispatcher::new(
        config.smtp_host.clone(),
        config.smtp_port,
        config.operation_timeout,
    );
    let bridge = Arc::new(Bridge::from_config(connector, dispatcher, &config));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server running on {}", addr);

    axum::serve(listener, http::router(bridge)).await?;
    Ok(())
}
