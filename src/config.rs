//! Server configuration
//!
//! Defaults match the long-standing deployment: port 54321 on all interfaces,
//! `data.db` in the working directory, 10 second idle timeout.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:54321";
pub const DEFAULT_DATABASE: &str = "data.db";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub database: PathBuf,
    /// Longest wait for the next chunk of a request
    pub idle_timeout: Duration,
    /// Requests growing past this without a terminator are abandoned
    pub max_message_bytes: usize,
    pub foreign_keys: bool,
    /// Serve from a private in-memory database instead of `database`
    pub in_memory: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 54321)),
            database: PathBuf::from(DEFAULT_DATABASE),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            foreign_keys: false,
            in_memory: false,
        }
    }
}

/// Command-line arguments for `acadb-server`
#[derive(Debug, Parser)]
#[command(name = "acadb-server", version, about = "Academic records store over a framed JSON protocol")]
pub struct Args {
    /// TCP address to listen on
    #[arg(long, env = "ACADB_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Path of the database file, created if missing
    #[arg(long, env = "ACADB_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Seconds to wait for more request bytes before dropping the connection
    #[arg(long, env = "ACADB_IDLE_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout_secs: u64,

    /// Largest request accepted, in bytes
    #[arg(long, env = "ACADB_MAX_MESSAGE_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,

    /// Enforce foreign key constraints
    #[arg(long, env = "ACADB_FOREIGN_KEYS")]
    pub foreign_keys: bool,

    /// Keep all data in memory; nothing is written to disk
    #[arg(long)]
    pub in_memory: bool,
}

impl Args {
    pub fn into_config(self) -> Result<ServerConfig, String> {
        if self.idle_timeout_secs == 0 {
            return Err("idle timeout must be at least 1 second".to_string());
        }
        if self.max_message_bytes == 0 {
            return Err("max message size must be positive".to_string());
        }
        Ok(ServerConfig {
            listen: self.listen,
            database: self.database,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_message_bytes: self.max_message_bytes,
            foreign_keys: self.foreign_keys,
            in_memory: self.in_memory,
        })
    }
}
