//! Registry of the WebSocket clients connected to this instance.
//!
//! Clients on other instances are reached through the attached fan-out
//! strategy, never through this registry.

use std::collections::HashMap;
use std::sync::Arc;

use pgsocket_core::packet::Packet;
use pgsocket_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};

/// Work queued for a single client. The connection's send task turns each
/// item into a WebSocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A packet to deliver as a JSON text frame. Shared between all the
    /// clients a broadcast reaches.
    Packet(Arc<Packet>),
    /// Keep-alive ping.
    Ping,
    /// Close the connection; nothing queued after it is sent.
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

struct Client {
    outbound: OutboundSender,
    connected_at: Timestamp,
}

pub struct WsManager {
    clients: RwLock<HashMap<String, Client>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register client `conn_id` and return the queue its send task drains.
    ///
    /// Registering an id twice replaces the earlier client, whose queue
    /// then ends.
    pub async fn add(&self, conn_id: String) -> OutboundReceiver {
        let (outbound, rx) = mpsc::unbounded_channel();
        let client = Client {
            outbound,
            connected_at: chrono::Utc::now(),
        };
        self.clients.write().await.insert(conn_id, client);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.clients.write().await.remove(conn_id);
    }

    pub async fn connected_at(&self, conn_id: &str) -> Option<Timestamp> {
        self.clients
            .read()
            .await
            .get(conn_id)
            .map(|client| client.connected_at)
    }

    /// Queue `packet` for every local client and return how many accepted
    /// it. Clients whose send task already ended are skipped; the handler
    /// removes them when their socket closes.
    pub async fn broadcast(&self, packet: &Packet) -> usize {
        let shared = Arc::new(packet.clone());
        self.send_all(Outbound::Packet(shared)).await
    }

    pub async fn ping_all(&self) -> usize {
        self.send_all(Outbound::Ping).await
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Ask every client to close, then forget them all.
    pub async fn shutdown_all(&self) {
        let mut clients = self.clients.write().await;
        for client in clients.values() {
            let _ = client.outbound.send(Outbound::Close);
        }
        let count = clients.len();
        clients.clear();
        tracing::info!(count, "Closed all WebSocket clients");
    }

    async fn send_all(&self, item: Outbound) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|client| client.outbound.send(item.clone()).is_ok())
            .count()
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
