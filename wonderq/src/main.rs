//! WonderQ - in-memory message queue
//!
//! Producers push JSON payloads, consumers lease batches of messages and
//! confirm them once processed. Leased messages that are not confirmed in
//! time become available again.

mod config;
mod router;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wonderq_queue::{AppState, QueueRegistry};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "wonderq")]
#[command(about = "In-memory message queue with visibility-timeout leases", long_about = None)]
struct Args {
    /// Port to listen on [default: 3000]
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Host to bind to [default: 0.0.0.0]
    #[arg(long, env = "WONDERQ_HOST")]
    host: Option<String>,

    /// Name of the queue served on the root routes [default: wonderq]
    #[arg(long, env = "WONDERQ_QUEUE")]
    queue: Option<String>,

    /// Lease duration in milliseconds for pushes without a timeout [default: 1000]
    #[arg(long, env = "WONDERQ_LEASE_TIMEOUT_MS")]
    lease_timeout_ms: Option<u64>,

    /// Messages leased by a GET without `amount` [default: 1]
    #[arg(long, env = "WONDERQ_RECEIVE_AMOUNT")]
    receive_amount: Option<usize>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "WONDERQ_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "WONDERQ_LOG_LEVEL")]
    log_level: String,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    /// Flags and their environment variables win over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(queue) = &self.queue {
            config.queue.name.clone_from(queue);
        }
        if let Some(ms) = self.lease_timeout_ms {
            config.queue.lease_timeout_ms = ms;
        }
        if let Some(amount) = self.receive_amount {
            config.queue.receive_amount = amount;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("wonderq={},tower_http=debug", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting WonderQ...");
    info!("  Queue: {}", config.queue.name);
    info!("  Lease timeout: {}ms", config.queue.lease_timeout_ms);

    let registry = Arc::new(QueueRegistry::with_defaults(config.queue.queue_config()));
    registry.create_queue(&config.queue.name)?;

    let state = AppState::new(registry, config.queue.name.clone())
        .with_receive_amount(config.queue.receive_amount);

    // Create router
    let app = router::create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
