use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::ws::manager::WsManager;

/// Ping every local client each `interval` so idle browser connections stay
/// open. Unrelated to the heartbeat between server instances.
///
/// Abort the returned handle to stop pinging.
pub fn start_client_ping(ws_manager: Arc<WsManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            ticker.tick().await;
            let pinged = ws_manager.ping_all().await;
            if pinged > 0 {
                tracing::debug!(pinged, "Pinged WebSocket clients");
            }
        }
    })
}
