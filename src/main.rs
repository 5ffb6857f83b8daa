//! Substance HTTP transport (v1)
//!
//! Serves request metadata over HTTP or HTTPS with content negotiation.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ ServerBootstrap ──▶ IncomingRequest ──▶ MetadataDispatcher
//!                     (plain | TLS)       (lazy metadata)      │ middleware chain
//!                                                              │ formatter (Accept)
//!     Client Response                                          ▼
//!     ◀──────────────────────────────────────────────────── formatted summary
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use substance_transport::config::{load_config, TransportConfig};
use substance_transport::http::{
    Instance, InstanceRegistry, JsonFormatter, MetadataDispatcher, ServerBootstrap, TextFormatter,
};
use substance_transport::lifecycle::shutdown_signal;
use substance_transport::observability::{init_logging, init_metrics};

#[derive(Parser)]
#[command(name = "substance-transport")]
#[command(about = "HTTP transport with request metadata and content negotiation", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TransportConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!("substance-transport v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.server.bind_address,
        secure = config.server.secure,
        shutdown_grace_secs = config.server.shutdown_grace_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let addr: SocketAddr = config.server.bind_address.parse()?;

    let registry = Arc::new(InstanceRegistry::new());
    let dispatcher = MetadataDispatcher::new(Arc::clone(&registry));
    let server = ServerBootstrap::new(&config.server, dispatcher, registry)?;

    server
        .register("formatter", Instance::formatter(JsonFormatter { pretty: true }))?
        .register("formatter", Instance::formatter(TextFormatter))?
        .use_middleware(|request, _response, next| {
            tracing::debug!(
                method = %request.method(),
                url = %request.url(),
                secure = request.is_secure(),
                "Request received"
            );
            next.proceed();
        });

    let running = server.listen(addr).await?;

    shutdown_signal().await;
    running.shutdown();
    running.closed().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
