//! pgsocket API server library.
//!
//! Exposes the building blocks (config, state, routes, WebSocket server and
//! the Postgres fan-out adapter override) so integration tests and the
//! binary entrypoint can both access them.

pub mod adapter;
pub mod config;
pub mod routes;
pub mod state;
pub mod ws;
