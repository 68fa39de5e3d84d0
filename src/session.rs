//! ConnectionSession - Per-connection state
//!
//! Every accepted connection gets a session that tracks its client id, peer
//! address and where it is in the exchange:
//!
//! ```text
//! Accepted -> Receiving -> Closed                               (no complete message)
//! Accepted -> Receiving -> Dispatching -> Responding -> Closed
//! ```
//!
//! Any state may go straight to `Closed` on a connection fault.

use std::net::SocketAddr;

use tracing::warn;

/// Unique identifier for a client connection
pub type ClientId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Receiving,
    Dispatching,
    Responding,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::Receiving => "receiving",
            ConnectionState::Dispatching => "dispatching",
            ConnectionState::Responding => "responding",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether `self -> next` is a legal step
    pub fn can_advance_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Accepted, Receiving)
                | (Receiving, Dispatching)
                | (Dispatching, Responding)
                | (Accepted | Receiving | Dispatching | Responding, Closed)
        )
    }
}

/// Session state for one client connection
///
/// Created on accept and dropped once the socket is closed.
pub struct ConnectionSession {
    pub id: ClientId,
    pub peer: Option<SocketAddr>,
    state: ConnectionState,
    /// Bytes of the request body, once received
    pub request_len: usize,
    /// Whether a response was written back
    pub responded: bool,
}

impl ConnectionSession {
    pub fn new(id: ClientId, peer: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer,
            state: ConnectionState::Accepted,
            request_len: 0,
            responded: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`.
    ///
    /// An illegal step is a bug in the server loop: it is logged, asserted in
    /// debug builds, and the state is left unchanged.
    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_advance_to(next) {
            warn!(
                client = self.id,
                from = self.state.as_str(),
                to = next.as_str(),
                "illegal connection state transition"
            );
            debug_assert!(false, "illegal transition {:?} -> {:?}", self.state, next);
            return false;
        }
        self.state = next;
        true
    }

    /// Mark the connection closed. Closing twice is harmless.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closed;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = ConnectionSession::new(1, None);

        assert_eq!(session.id, 1);
        assert_eq!(session.state(), ConnectionState::Accepted);
        assert!(!session.responded);
        assert!(!session.is_closed());
    }

    #[test]
    fn test_full_exchange() {
        let mut session = ConnectionSession::new(2, Some("127.0.0.1:9".parse().unwrap()));

        assert!(session.advance(ConnectionState::Receiving));
        assert!(session.advance(ConnectionState::Dispatching));
        assert!(session.advance(ConnectionState::Responding));
        assert!(session.advance(ConnectionState::Closed));
        assert!(session.is_closed());
    }

    #[test]
    fn test_empty_message_path() {
        let mut session = ConnectionSession::new(3, None);

        assert!(session.advance(ConnectionState::Receiving));
        assert!(session.advance(ConnectionState::Closed));
    }

    #[test]
    fn test_legal_transitions() {
        use ConnectionState::*;

        assert!(Accepted.can_advance_to(Receiving));
        assert!(Receiving.can_advance_to(Closed));
        assert!(Responding.can_advance_to(Closed));

        assert!(!Accepted.can_advance_to(Dispatching));
        assert!(!Receiving.can_advance_to(Responding));
        assert!(!Closed.can_advance_to(Receiving));
        assert!(!Closed.can_advance_to(Closed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = ConnectionSession::new(4, None);
        session.close();
        session.close();
        assert!(session.is_closed());
    }
}
