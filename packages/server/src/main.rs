//! SimpleMX management server
//!
//! Runs a management listener that exposes its own counters as
//! `simplemx:name=Listener`.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 127.0.0.1:8000
//! simplemx-server --port 8000
//!
//! # Settings from a file, port overridden on the command line
//! simplemx-server --config server.json --port 9000
//! ```

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use simplemx_server::{ManagementServer, ServerConfig};

/// SimpleMX management server
#[derive(Parser, Debug)]
#[command(name = "simplemx-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of connected clients
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            ServerConfig::from_file(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(max_connections) = args.max_connections {
        config.max_connections = max_connections;
    }

    let server = ManagementServer::new(config);
    let addr = server.start().await?;

    let stats = Arc::clone(server.stats());
    let name = server.register(&stats).await?;
    info!(%addr, %name, "SimpleMX server v{} ready", env!("CARGO_PKG_VERSION"));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    server.stop().await?;
    info!("SimpleMX server stopped");
    Ok(())
}
