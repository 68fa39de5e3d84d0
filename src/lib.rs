//! acadb - Academic records store served over a framed JSON query protocol
//!
//! A client connects over TCP, sends one JSON query terminated by `"\n\n"`,
//! gets one JSON response terminated the same way, and the connection closes.
//!
//! Pipeline per connection:
//! [`server`] accepts → [`framing`] reads one message → [`query`] parses it →
//! [`dispatch`] runs it against the [`store`] → the response goes back through
//! [`framing`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod metrics;
pub mod query;
pub mod schema;
pub mod server;
pub mod session;
pub mod store;

pub use config::ServerConfig;
pub use error::{QueryError, Result};
pub use query::{QueryKind, Request, Response};
pub use schema::Entity;
pub use server::{Server, ShutdownHandle};
pub use store::Store;
