//! Capability traits at the seams between server, database and fan-out.
//!
//! Each trait carries only the methods the adapter override actually uses,
//! so tests can substitute the real server, pool or fan-out library.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{CoreError, FanoutError};
use crate::options::FanoutOptions;
use crate::packet::Packet;

/// Relays packets between server instances sharing one message channel.
#[async_trait]
pub trait FanoutAdapter: Send + Sync {
    /// Identifier of this node on the shared channel.
    fn uid(&self) -> &str;

    /// Publish a packet to every other node.
    async fn broadcast(&self, packet: &Packet) -> Result<(), FanoutError>;

    /// Receive packets published by other nodes.
    fn subscribe(&self) -> broadcast::Receiver<Packet>;

    /// Number of live nodes, this one included.
    async fn server_count(&self) -> usize;

    /// Stop background work. Calling it twice is harmless.
    async fn close(&self);
}

/// Builds a fan-out strategy from a connection pool.
#[async_trait]
pub trait AdapterFactory<P>: Send + Sync
where
    P: Send + 'static,
{
    async fn create_adapter(
        &self,
        pool: P,
        options: FanoutOptions,
    ) -> Result<Arc<dyn FanoutAdapter>, FanoutError>;
}

/// A WebSocket server instance that can have a fan-out strategy attached.
pub trait SocketServer: Send {
    /// Route cross-instance delivery through `adapter`, replacing any
    /// previously attached strategy.
    fn attach_strategy(&mut self, adapter: Arc<dyn FanoutAdapter>);
}

/// Baseline server construction.
#[async_trait]
pub trait ServerFactory: Send + Sync {
    type Server: SocketServer;
    type Options: Send + 'static;

    async fn create(
        &self,
        port: u16,
        options: Option<Self::Options>,
    ) -> Result<Self::Server, CoreError>;
}

/// Read access to the application's database connections.
pub trait DatabaseAccess: Send + Sync {
    type Pool: Clone + Send + Sync + 'static;

    /// The pool of the primary ("master") connection.
    fn master_pool(&self) -> Result<Self::Pool, CoreError>;
}
