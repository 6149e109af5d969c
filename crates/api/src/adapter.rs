//! WebSocket server construction with Postgres-backed fan-out.
//!
//! [`PgWebSocketAdapter`] wraps the default server construction and attaches
//! a fan-out strategy built from the primary database pool, so clients
//! connected to different instances receive each other's packets.
//!
//! The strategy runs with [`FanoutOptions::low_write`]: its periodic
//! liveness `pg_notify` forces a write on the database host, so the heartbeat
//! is stretched from seconds to two hours. Dead instances are therefore
//! noticed late, which only affects the reported server count.

use std::sync::Arc;

use pgsocket_core::error::CoreError;
use pgsocket_core::options::FanoutOptions;
use pgsocket_core::ports::{AdapterFactory, DatabaseAccess, ServerFactory, SocketServer};
use pgsocket_db::Database;
use pgsocket_fanout::PgAdapterFactory;

use crate::ws::WsServerFactory;

/// Server construction that attaches a database-backed fan-out strategy.
pub struct PgWebSocketAdapter<S, D, F> {
    base: S,
    database: Arc<D>,
    factory: F,
}

/// The production wiring: axum WebSocket server, sqlx pool, `LISTEN`/`NOTIFY`.
pub type PostgresWebSocketAdapter = PgWebSocketAdapter<WsServerFactory, Database, PgAdapterFactory>;

impl PostgresWebSocketAdapter {
    pub fn postgres(database: Arc<Database>) -> Self {
        Self::new(WsServerFactory, database, PgAdapterFactory)
    }
}

impl<S, D, F> PgWebSocketAdapter<S, D, F> {
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<S, D, F> PgWebSocketAdapter<S, D, F>
where
    S: ServerFactory,
    D: DatabaseAccess,
    F: AdapterFactory<D::Pool>,
{
    pub fn new(base: S, database: Arc<D>, factory: F) -> Self {
        Self {
            base,
            database,
            factory,
        }
    }

    /// Build a server exactly as `base` would, then attach a fan-out
    /// strategy over the primary pool.
    ///
    /// Every call looks the pool up again and builds a fresh strategy.
    /// Errors from any step are returned unchanged; when the pool lookup
    /// fails no strategy is built.
    pub async fn create_io_server(
        &self,
        port: u16,
        options: Option<S::Options>,
    ) -> Result<S::Server, CoreError> {
        let mut server = self.base.create(port, options).await?;
        let pool = self.database.master_pool()?;
        let adapter = self
            .factory
            .create_adapter(pool, FanoutOptions::low_write())
            .await?;
        server.attach_strategy(adapter);
        Ok(server)
    }
}
