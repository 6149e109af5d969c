//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use pgsocket_core::error::FanoutError;
use pgsocket_core::packet::Packet;
use pgsocket_core::ports::FanoutAdapter;
use tokio::sync::broadcast;
use tower::ServiceExt;

/// In-memory fan-out double.
///
/// Packets pushed into `incoming` look like they came from another
/// instance; everything passed to `broadcast` is recorded in `published`.
pub struct StubAdapter {
    uid: String,
    pub incoming: broadcast::Sender<Packet>,
    pub published: Mutex<Vec<Packet>>,
    pub closed: AtomicBool,
    pub servers: usize,
}

impl StubAdapter {
    pub fn new(uid: &str) -> Arc<Self> {
        Self::with_server_count(uid, 1)
    }

    pub fn with_server_count(uid: &str, servers: usize) -> Arc<Self> {
        let (incoming, _) = broadcast::channel(16);
        Arc::new(Self {
            uid: uid.to_string(),
            incoming,
            published: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            servers,
        })
    }

    pub fn published(&self) -> Vec<Packet> {
        self.published.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FanoutAdapter for StubAdapter {
    fn uid(&self) -> &str {
        &self.uid
    }

    async fn broadcast(&self, packet: &Packet) -> Result<(), FanoutError> {
        if self.is_closed() {
            return Err(FanoutError::Closed);
        }
        self.published.lock().unwrap().push(packet.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Packet> {
        self.incoming.subscribe()
    }

    async fn server_count(&self) -> usize {
        self.servers
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Send a GET request through the router.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
