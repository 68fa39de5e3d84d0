//! acadb-server - TCP front end for the academic records store
//!
//! Usage:
//!   acadb-server [--listen 0.0.0.0:54321] [--database data.db] [--idle-timeout-secs 10]
//!
//! Protocol:
//!   Request:  {"type": "select", "table": "student", "payload": ["student_id", 1]} "\n\n"
//!   Response: {"success": true, "payload": [[1, "Alice", "2023-09-01", 10, 500]]} "\n\n"
//!
//! Stops on SIGINT or SIGTERM and exits 0.

use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use acadb::config::Args;
use acadb::Server;

fn main() -> Result<()> {
    let config = Args::parse().into_config().map_err(|e| anyhow!(e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting acadb-server");
    if config.in_memory {
        info!("serving from an in-memory database");
    } else {
        info!(path = %config.database.display(), "opening database");
    }

    let listen = config.listen;
    let server = Server::bind(config).with_context(|| format!("failed to start on {}", listen))?;

    let handle = server.shutdown_handle();
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "received signal");
            handle.shutdown();
        }
    });

    server.run()?;
    Ok(())
}
