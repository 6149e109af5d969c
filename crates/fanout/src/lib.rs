//! Cross-instance packet fan-out over Postgres `LISTEN` / `NOTIFY`.
//!
//! - [`PgFanoutAdapter`]: the strategy attached to a WebSocket server.
//! - [`PgAdapterFactory`]: builds adapters from a pool and options.
//! - [`wire`]: JSON messages exchanged on the notification channel.
//! - [`NodeTracker`]: peer liveness bookkeeping.

pub mod adapter;
pub mod factory;
pub mod nodes;
pub mod wire;

pub use adapter::PgFanoutAdapter;
pub use factory::PgAdapterFactory;
pub use nodes::NodeTracker;
