//! hashpool server binary.
//!
//! Listens for client connections, reads 8192-byte frames, and answers each
//! with the 40-character hex digest of its contents.

use hashpool::config::Config;
use hashpool::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Argument errors (non-integer port or pool size) exit before this
    // returns; nothing has been opened yet.
    let config = Config::load()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        workers = config.workers,
        "Starting hashpool server"
    );

    server::run(&config)?;

    Ok(())
}
