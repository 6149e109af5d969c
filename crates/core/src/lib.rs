//! Shared building blocks for the pgsocket workspace.
//!
//! Defines the capability traits that sit between the WebSocket server, the
//! database access layer and the fan-out strategy, plus the option and
//! error types they exchange. Nothing in this crate talks to Postgres.

pub mod error;
pub mod options;
pub mod packet;
pub mod ports;
pub mod types;

pub use error::{CoreError, FanoutError};
pub use options::FanoutOptions;
pub use packet::Packet;
pub use ports::{AdapterFactory, DatabaseAccess, FanoutAdapter, ServerFactory, SocketServer};
