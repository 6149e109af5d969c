//! WebSocket infrastructure for real-time communication.
//!
//! Provides the server instance, local connection management, client
//! pings, and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;
pub mod server;

pub use handler::ws_handler;
pub use heartbeat::start_client_ping;
pub use manager::{Outbound, WsManager};
pub use server::{Emitter, WsServer, WsServerFactory, WsServerOptions};
