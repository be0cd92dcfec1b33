//! Example relay server binary.
//!
//! ```bash
//! relay-server --bind 0.0.0.0:7070
//! ```
//!
//! Accepts connections, answers the `"authenticate"` handshake request with
//! [`relay_server::AllowAllUsers`], and echoes every subsequent request's
//! arguments back in its response body. This is a demonstration wiring of
//! `relay-core`/`relay-proto`, not a production authenticator or protocol.

use std::sync::Arc;

use clap::Parser;
use relay_core::ConnectionConfig;
use relay_proto::TextSerializer;
use relay_server::{AllowAllUsers, EchoHandler, Listener, ListenerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Example relay protocol server.
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Example relay messaging protocol server")]
#[command(version)]
struct Args {
    /// Address to bind to.
    #[arg(short, long, default_value = "0.0.0.0:7070")]
    bind: String,

    /// Maximum concurrent connections.
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Per-request timeout, in seconds.
    #[arg(long, default_value = "60")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("relay-server starting");

    let config = ListenerConfig {
        connection: ConnectionConfig {
            request_timeout: std::time::Duration::from_secs(args.request_timeout_secs),
        },
        max_connections: args.max_connections,
        ..ListenerConfig::default()
    };

    let listener =
        Arc::new(Listener::new(Arc::new(TextSerializer), Arc::new(AllowAllUsers), Arc::new(EchoHandler), config));

    listener.serve(&args.bind).await?;
    Ok(())
}
