//! The WebSocket server instance and its default construction.
//!
//! [`WsServerFactory`] builds a bare [`WsServer`] that only reaches clients
//! connected to this process. Attaching a fan-out strategy (see
//! [`crate::adapter`]) extends every emit to the other instances.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderName;
use axum::routing::get;
use axum::Router;
use pgsocket_core::error::{CoreError, FanoutError};
use pgsocket_core::packet::Packet;
use pgsocket_core::ports::{FanoutAdapter, ServerFactory, SocketServer};
use pgsocket_db::DbPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::AppState;
use crate::ws::handler::ws_handler;
use crate::ws::heartbeat::start_client_ping;
use crate::ws::manager::WsManager;

/// Server construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsServerOptions {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Route serving the WebSocket upgrade (default: `/ws`).
    pub path: String,
    /// Interval between Ping frames to local clients (default: 30s).
    pub ping_interval: Duration,
    /// Upper bound on post-shutdown cleanup (default: 30s).
    pub shutdown_timeout: Duration,
}

impl Default for WsServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            path: "/ws".to_string(),
            ping_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

struct AttachedStrategy {
    adapter: Arc<dyn FanoutAdapter>,
    relay: JoinHandle<()>,
}

/// A WebSocket server bound to one port.
pub struct WsServer {
    port: u16,
    options: WsServerOptions,
    manager: Arc<WsManager>,
    strategy: Option<AttachedStrategy>,
}

impl WsServer {
    pub fn new(port: u16, options: WsServerOptions) -> Self {
        Self {
            port,
            options,
            manager: Arc::new(WsManager::new()),
            strategy: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn options(&self) -> &WsServerOptions {
        &self.options
    }

    pub fn manager(&self) -> &Arc<WsManager> {
        &self.manager
    }

    /// The currently attached fan-out strategy, if any.
    pub fn strategy(&self) -> Option<&Arc<dyn FanoutAdapter>> {
        self.strategy.as_ref().map(|s| &s.adapter)
    }

    /// A cloneable handle for emitting packets after the server has been
    /// moved into [`serve`](Self::serve).
    ///
    /// The handle captures the strategy attached at the time of the call.
    pub fn emitter(&self) -> Emitter {
        Emitter {
            manager: Arc::clone(&self.manager),
            adapter: self.strategy().cloned(),
        }
    }

    /// Deliver `packet` to local clients and publish it to other instances.
    pub async fn emit(&self, packet: &Packet) -> Result<usize, FanoutError> {
        self.emitter().emit(packet).await
    }

    /// Build the HTTP router: health check plus the WebSocket upgrade route.
    pub fn router(&self, pool: DbPool) -> Router {
        let state = AppState {
            pool,
            ws_manager: Arc::clone(&self.manager),
            fanout: self.strategy().cloned(),
        };

        let request_id_header = HeaderName::from_static("x-request-id");

        Router::new()
            .merge(routes::health::router())
            .route(&self.options.path, get(ws_handler))
            // -- Middleware stack (applied bottom-up) --
            .layer(CatchPanicLayer::new())
            .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
            .with_state(state)
    }

    /// Bind `host:port` and serve until `shutdown` resolves.
    pub async fn serve<F>(self, pool: DbPool, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let host: IpAddr = self
            .options
            .host
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let addr = SocketAddr::new(host, self.port);
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_listener(pool, listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then
    /// close local clients and the attached strategy.
    pub async fn serve_with_listener<F>(
        mut self,
        pool: DbPool,
        listener: TcpListener,
        shutdown: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router(pool);
        let ping_handle = start_client_ping(Arc::clone(&self.manager), self.options.ping_interval);

        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.options.path,
            fanout = self.strategy.is_some(),
            "Starting WebSocket server"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server stopped accepting connections, cleaning up");
        ping_handle.abort();

        let manager = Arc::clone(&self.manager);
        let strategy = self.strategy.take();
        let cleanup = async move {
            manager.shutdown_all().await;
            if let Some(strategy) = strategy {
                strategy.relay.abort();
                strategy.adapter.close().await;
            }
        };
        if tokio::time::timeout(self.options.shutdown_timeout, cleanup)
            .await
            .is_err()
        {
            tracing::warn!("Shutdown cleanup timed out");
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}

impl SocketServer for WsServer {
    fn attach_strategy(&mut self, adapter: Arc<dyn FanoutAdapter>) {
        if let Some(previous) = self.strategy.take() {
            previous.relay.abort();
            tracing::info!(uid = %previous.adapter.uid(), "Replacing fan-out strategy");
            tokio::spawn(async move { previous.adapter.close().await });
        }

        let relay = spawn_relay(adapter.subscribe(), Arc::clone(&self.manager));
        tracing::info!(uid = %adapter.uid(), port = self.port, "Fan-out strategy attached");
        self.strategy = Some(AttachedStrategy { adapter, relay });
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        if let Some(strategy) = &self.strategy {
            strategy.relay.abort();
        }
    }
}

/// Emits packets on behalf of a [`WsServer`].
#[derive(Clone)]
pub struct Emitter {
    manager: Arc<WsManager>,
    adapter: Option<Arc<dyn FanoutAdapter>>,
}

impl Emitter {
    /// Deliver `packet` to local clients, then publish it through the
    /// fan-out strategy. Returns the number of local clients reached.
    pub async fn emit(&self, packet: &Packet) -> Result<usize, FanoutError> {
        let delivered = self.manager.broadcast(packet).await;
        if let Some(adapter) = &self.adapter {
            adapter.broadcast(packet).await?;
        }
        Ok(delivered)
    }

    pub async fn local_connections(&self) -> usize {
        self.manager.connection_count().await
    }
}

/// Forward packets received from other instances to local clients.
fn spawn_relay(mut incoming: broadcast::Receiver<Packet>, manager: Arc<WsManager>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match incoming.recv().await {
                Ok(packet) => {
                    let delivered = manager.broadcast(&packet).await;
                    tracing::trace!(event = %packet.event, delivered, "Relayed remote packet");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Fan-out relay lagged, some packets were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Fan-out channel closed, relay stopping");
                    break;
                }
            }
        }
    })
}

/// Default server construction: a bare [`WsServer`] with no fan-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsServerFactory;

#[async_trait]
impl ServerFactory for WsServerFactory {
    type Server = WsServer;
    type Options = WsServerOptions;

    async fn create(
        &self,
        port: u16,
        options: Option<WsServerOptions>,
    ) -> Result<WsServer, CoreError> {
        let options = options.unwrap_or_default();
        if !options.path.starts_with('/') {
            return Err(CoreError::Validation(format!(
                "WebSocket path '{}' must start with '/'",
                options.path
            )));
        }
        if options.ping_interval.is_zero() {
            return Err(CoreError::Validation(
                "ping_interval must be non-zero".into(),
            ));
        }
        Ok(WsServer::new(port, options))
    }
}
