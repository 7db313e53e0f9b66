//! Forward proxy binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌────────────────────────────────────────────┐
//!                         │                FORWARD PROXY               │
//!                         │                                            │
//!     Client Request      │  ┌─────────┐   ┌─────────┐   ┌──────────┐  │
//!     ────────────────────┼─▶│   net   │──▶│  http   │──▶│ dispatch │  │
//!                         │  │listener │   │ server  │   └────┬─────┘  │
//!                         │  └─────────┘   └─────────┘        │        │
//!                         │                     ┌─────────────┴──┐     │
//!                         │                     ▼                ▼     │
//!                         │               ┌──────────┐    ┌──────────┐ │
//!                         │               │  relay   │    │  tunnel  │─┼──── Target
//!                         │               │ (plain)  │────┼──────────┼─┼──── Origin
//!                         │               └──────────┘    └──────────┘ │
//!                         │                                            │
//!                         │  Cross-cutting: config, security (auth),   │
//!                         │  observability, lifecycle                  │
//!                         └────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use forward_proxy::config::{apply_env, read_config, validate_config, ConfigError, ProxyConfig};
use forward_proxy::http::HttpServer;
use forward_proxy::lifecycle::{shutdown_on_signal, Shutdown};
use forward_proxy::net::Listener;
use forward_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Authenticating HTTP forward proxy with CONNECT tunnelling", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PROXY_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(host) = &self.host {
            config.listener.host = host.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

fn load(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    apply_env(&mut config)?;
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init_logging(&config.observability)?;

    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        max_connections = config.listener.max_connections,
        connect_timeout_secs = config.timeouts.connect_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = Listener::bind(&config.listener).await?;
    let port = config.listener.port;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, shutdown.clone());

    let identity = server.state().authenticator.identity();
    tracing::info!(
        port,
        username = %identity.username(),
        password = %identity.masked_password(),
        "Proxy credentials configured"
    );

    tokio::spawn(shutdown_on_signal(shutdown));
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
