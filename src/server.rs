//! Connection server
//!
//! Accepts one TCP connection at a time and runs a single exchange on it:
//! read one framed request, dispatch it, write one framed response, close.
//! Nothing is handled concurrently; the next connection waits in the listen
//! backlog until the current one is closed.
//!
//! A connection fault (timeout, reset, oversized request) drops that
//! connection without a response. Only a [`ShutdownHandle`] ends the accept
//! loop.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatch;
use crate::error::Result;
use crate::framing::{self, Frame};
use crate::metrics::Metrics;
use crate::session::{ClientId, ConnectionSession, ConnectionState};
use crate::store::Store;

const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Stops a running [`Server`] from any thread.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Ask the accept loop to stop.
    ///
    /// The loop is usually parked in `accept`, so this also opens a throwaway
    /// connection to the listener to get it moving.
    pub fn shutdown(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, WAKE_CONNECT_TIMEOUT) {
            warn!(addr = %self.wake_addr, error = %e, "could not wake accept loop");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    store: Store,
    config: ServerConfig,
    metrics: Arc<Metrics>,
    shutdown: ShutdownHandle,
    next_client_id: ClientId,
}

impl Server {
    /// Open the store and bind the listening socket.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let store = if config.in_memory {
            Store::in_memory(config.foreign_keys)?
        } else {
            Store::open(&config.database, config.foreign_keys)?
        };
        Self::with_store(config, store)
    }

    /// Bind the listening socket in front of an already opened store.
    pub fn with_store(config: ServerConfig, store: Store) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)?;
        let local_addr = listener.local_addr()?;

        let shutdown = ShutdownHandle {
            requested: Arc::new(AtomicBool::new(false)),
            wake_addr: wake_addr(local_addr),
        };

        Ok(Self {
            listener,
            local_addr,
            store,
            config,
            metrics: Arc::new(Metrics::new()),
            shutdown,
            next_client_id: 1,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the accept loop until shutdown is requested.
    ///
    /// Consumes the server; the listening socket is closed when this returns.
    pub fn run(mut self) -> Result<()> {
        info!(addr = %self.local_addr, "listening");

        loop {
            let accepted = self.listener.accept();

            if self.shutdown.is_shutdown() {
                break;
            }

            match accepted {
                Ok((stream, peer)) => {
                    let client_id = self.next_client_id;
                    self.next_client_id += 1;
                    self.handle_connection(stream, peer, client_id);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => warn!(error = %e, "accept error"),
            }
        }

        info!("Stopping server...");
        let snap = self.metrics.snapshot();
        info!(
            requests = snap.request_count,
            errors = snap.error_count,
            slow = snap.slow_request_count,
            p50_us = snap.p50_us,
            p95_us = snap.p95_us,
            p99_us = snap.p99_us,
            uptime_secs = snap.uptime_secs,
            "server stopped"
        );
        Ok(())
    }

    /// Serve one connection. Never fails: faults are logged and the socket
    /// is closed on every path when `stream` goes out of scope.
    fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr, client_id: ClientId) {
        let mut session = ConnectionSession::new(client_id, Some(peer));
        debug!(client = client_id, %peer, "client connected");

        if let Err(e) = self.exchange(&mut stream, &mut session) {
            warn!(
                client = client_id,
                state = session.state().as_str(),
                error = %e,
                "connection fault"
            );
        }

        session.close();
        debug!(
            client = client_id,
            request_bytes = session.request_len,
            responded = session.responded,
            "client disconnected"
        );
    }

    fn exchange(&self, stream: &mut TcpStream, session: &mut ConnectionSession) -> io::Result<()> {
        stream.set_read_timeout(Some(self.config.idle_timeout))?;
        stream.set_write_timeout(Some(self.config.idle_timeout))?;

        session.advance(ConnectionState::Receiving);
        let body = match framing::read_message(stream, self.config.max_message_bytes)? {
            Frame::Complete(body) if !body.is_empty() => body,
            Frame::Complete(_) => {
                debug!(client = session.id, "empty message, nothing to dispatch");
                return Ok(());
            }
            Frame::Incomplete(partial) => {
                debug!(
                    client = session.id,
                    buffered = partial.len(),
                    "no complete message before close or timeout"
                );
                return Ok(());
            }
        };
        session.request_len = body.len();

        session.advance(ConnectionState::Dispatching);
        let response = dispatch::handle_message(&self.store, &body, Some(&self.metrics));

        session.advance(ConnectionState::Responding);
        let bytes = response.to_bytes().map_err(io::Error::from)?;
        framing::write_message(stream, &bytes)?;
        session.responded = true;

        Ok(())
    }
}

/// Address a local client can reach the listener on.
fn wake_addr(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local.port())
        }
        _ => local,
    }
}
