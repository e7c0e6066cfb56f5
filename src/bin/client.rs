//! hashpool client binary: the load generator.
//!
//! Sends random 8192-byte frames at a fixed rate and verifies that every
//! frame's digest comes back from the server.

use clap::Parser;
use hashpool::client::{self, ClientConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the client
#[derive(Parser, Debug)]
#[command(name = "hashpool-client")]
#[command(version = "0.1.0")]
#[command(about = "Load generator for the hashpool server", long_about = None)]
struct CliArgs {
    /// Address of the server to connect to
    server_address: String,

    /// Port the server is listening on
    port: u16,

    /// Frames to send per second
    messages_per_second: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        server = %args.server_address,
        port = args.port,
        rate = args.messages_per_second,
        "Starting hashpool client"
    );

    client::run(&ClientConfig {
        server: args.server_address,
        port: args.port,
        rate: args.messages_per_second,
    })?;

    Ok(())
}
