//! sprig-demo server binary

use clap::Parser;
use sprig_core::{lifecycle, Server, ServerConfig, ShutdownOutcome};
use sprig_demo::{mount, UserRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use mimalloc for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "sprig-demo")]
#[command(about = "In-memory user service", long_about = None)]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, env = "SPRIG_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "SPRIG_PORT", default_value_t = 8000)]
    port: u16,

    /// Maximum concurrently running handlers (default: 100 per core)
    #[arg(long, env = "SPRIG_MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Seconds to wait for in-flight requests on shutdown
    #[arg(long, env = "SPRIG_SHUTDOWN_GRACE", default_value_t = 5)]
    shutdown_grace: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "SPRIG_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,

    /// Seconds allowed for reading a request body
    #[arg(long, env = "SPRIG_READ_TIMEOUT", default_value_t = 5)]
    read_timeout: u64,

    /// Seconds a response write may stall before the connection is dropped
    #[arg(long, env = "SPRIG_WRITE_TIMEOUT", default_value_t = 10)]
    write_timeout: u64,

    /// Seconds an idle keep-alive connection is kept open
    #[arg(long, env = "SPRIG_IDLE_TIMEOUT", default_value_t = 15)]
    idle_timeout: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            hostname: self.host,
            port: self.port,
            max_in_flight: self.max_in_flight.unwrap_or(defaults.max_in_flight),
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            max_body_bytes: self.max_body_bytes.unwrap_or(defaults.max_body_bytes),
            read_timeout: Duration::from_secs(self.read_timeout),
            write_timeout: Duration::from_secs(self.write_timeout),
            idle_timeout: Duration::from_secs(self.idle_timeout),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sprig_demo=info,sprig_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config();
    tracing::info!(port = config.port, "server is starting");

    let server = Server::new(config);
    mount(&server, Arc::new(UserRepository::seeded()));

    match server.run(lifecycle::shutdown_signal()).await? {
        ShutdownOutcome::Drained => {}
        ShutdownOutcome::TimedOut {
            connections,
            handlers,
        } => {
            tracing::warn!(connections, handlers, "server forced to shutdown");
        }
    }

    tracing::info!("server gracefully stopped");
    Ok(())
}
