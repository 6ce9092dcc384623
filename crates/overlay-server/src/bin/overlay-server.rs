//! StreamOverlay server - static overlay pages, CA download and signaling API
//!
//! Usage:
//!   overlay-server                         Serve ./public on :1900 (TLS) and :1901
//!   overlay-server --root site --verbose   Serve another directory with debug logs
//!   overlay-server --print-config          Print a sample config.toml

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use overlay_core::{Config, ConfigError};
use overlay_server::Server;

#[derive(Parser)]
#[command(name = "overlay-server")]
#[command(about = "Dual HTTP/HTTPS server for stream overlays", long_about = None)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(short, long, env = "OVERLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory served as the site root
    #[arg(short, long, env = "OVERLAY_ROOT")]
    root: Option<PathBuf>,

    /// Bind address for both listeners
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Plaintext HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// HTTPS port
    #[arg(long)]
    https_port: Option<u16>,

    /// TLS certificate chain (PEM)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long)]
    key: Option<PathBuf>,

    /// CA certificate offered at /ca.crt
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Command-line flags take precedence over the file
    fn apply(self, config: &mut Config) {
        if let Some(root) = self.root {
            config.content.root = root;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(port) = self.http_port {
            config.server.http_port = port;
        }
        if let Some(port) = self.https_port {
            config.server.https_port = port;
        }
        if let Some(cert) = self.cert {
            config.tls.cert = cert;
        }
        if let Some(key) = self.key {
            config.tls.key = key;
        }
        if let Some(ca_cert) = self.ca_cert {
            config.content.ca_cert = ca_cert;
        }
    }
}

/// File (or defaults) first, then flags, then validation of the result
fn build_config(cli: Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", Config::sample());
        return Ok(());
    }

    // Set up logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = build_config(cli)?;
    let server = Server::new(config)?;
    let (stop, shutdown) = watch::channel(false);

    // Handle Ctrl+C; the sender must stay alive or the listeners stop
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Stopping both servers...");
                let _ = stop.send(true);
            }
            Err(e) => {
                error!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    if let Err(e) = server.run(shutdown).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Servers stopped");
    Ok(())
}
