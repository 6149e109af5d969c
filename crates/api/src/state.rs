use std::sync::Arc;

use pgsocket_core::ports::FanoutAdapter;

use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: pgsocket_db::DbPool,
    /// Local WebSocket connections.
    pub ws_manager: Arc<WsManager>,
    /// Fan-out strategy attached to the server, if any.
    pub fanout: Option<Arc<dyn FanoutAdapter>>,
}
