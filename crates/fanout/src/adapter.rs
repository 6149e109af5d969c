//! Fan-out over Postgres `LISTEN` / `NOTIFY`.
//!
//! Each [`PgFanoutAdapter`] holds one dedicated listening connection on the
//! channel `"{prefix}#{namespace}"` and publishes with `pg_notify` through
//! the shared pool. Three background tasks run per adapter:
//!
//! 1. the listener, which decodes notifications from peers;
//! 2. the heartbeat, which announces liveness and prunes silent peers;
//! 3. the attachment cleanup, which deletes parked payloads once stale.
//!
//! All three stop when the adapter is closed or dropped.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pgsocket_core::error::FanoutError;
use pgsocket_core::options::FanoutOptions;
use pgsocket_core::packet::Packet;
use pgsocket_core::ports::FanoutAdapter;
use pgsocket_core::types::DbId;
use pgsocket_db::repositories::AttachmentRepo;
use pgsocket_db::DbPool;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;

use crate::nodes::NodeTracker;
use crate::wire::{self, WireBody};

/// Buffer for packets received from peers and not yet relayed locally.
const INCOMING_CAPACITY: usize = 1024;

/// Pause before retrying after the listener connection failed to recover.
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct PgFanoutAdapter {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    uid: String,
    pool: DbPool,
    channel: String,
    options: FanoutOptions,
    nodes: Mutex<NodeTracker>,
    /// When this node last sent anything on the channel. Any message proves
    /// liveness to peers, so the next heartbeat is due one interval later.
    last_publish: Mutex<TokioInstant>,
    incoming: broadcast::Sender<Packet>,
}

impl PgFanoutAdapter {
    /// Validate `options`, start listening and spawn the background tasks.
    ///
    /// Announces this node with an initial heartbeat before returning.
    pub async fn start(pool: DbPool, options: FanoutOptions) -> Result<Self, FanoutError> {
        options.validate()?;

        let channel = options.channel();
        let mut listener = PgListener::connect_with(&pool)
            .await
            .map_err(FanoutError::transport)?;
        listener
            .listen(&channel)
            .await
            .map_err(FanoutError::transport)?;

        let (incoming, _) = broadcast::channel(INCOMING_CAPACITY);
        let inner = Arc::new(Inner {
            uid: uuid::Uuid::new_v4().to_string(),
            pool,
            channel,
            nodes: Mutex::new(NodeTracker::new(options.heartbeat_timeout)),
            last_publish: Mutex::new(TokioInstant::now()),
            options,
            incoming,
        });
        let cancel = CancellationToken::new();

        let tasks = vec![
            tokio::spawn(listen_loop(
                Arc::clone(&inner),
                listener,
                cancel.clone(),
            )),
            tokio::spawn(heartbeat_loop(Arc::clone(&inner), cancel.clone())),
            tokio::spawn(cleanup_loop(Arc::clone(&inner), cancel.clone())),
        ];

        let adapter = Self {
            inner,
            cancel,
            tasks: Mutex::new(tasks),
        };

        adapter.inner.publish(&WireBody::InitialHeartbeat).await?;
        tracing::info!(
            uid = %adapter.inner.uid,
            channel = %adapter.inner.channel,
            heartbeat_interval = ?adapter.inner.options.heartbeat_interval,
            heartbeat_timeout = ?adapter.inner.options.heartbeat_timeout,
            "Postgres fan-out adapter started"
        );

        Ok(adapter)
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }
}

#[async_trait]
impl FanoutAdapter for PgFanoutAdapter {
    fn uid(&self) -> &str {
        &self.inner.uid
    }

    async fn broadcast(&self, packet: &Packet) -> Result<(), FanoutError> {
        if self.cancel.is_cancelled() {
            return Err(FanoutError::Closed);
        }
        self.inner.broadcast(packet).await
    }

    fn subscribe(&self) -> broadcast::Receiver<Packet> {
        self.inner.incoming.subscribe()
    }

    async fn server_count(&self) -> usize {
        self.inner.live_peers() + 1
    }

    async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!(uid = %self.inner.uid, "Postgres fan-out adapter closed");
    }
}

impl Drop for PgFanoutAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Inner {
    async fn broadcast(&self, packet: &Packet) -> Result<(), FanoutError> {
        let body = WireBody::Broadcast {
            packet: packet.clone(),
        };
        let payload = wire::encode(&self.uid, &body)?;
        if payload.len() <= self.options.payload_threshold {
            return self.notify(&payload).await;
        }

        let bytes = serde_json::to_vec(packet)?;
        let attachment_id = AttachmentRepo::insert(&self.pool, &self.options.table_name, &bytes)
            .await
            .map_err(FanoutError::transport)?;
        tracing::debug!(
            attachment_id,
            size = bytes.len(),
            "Packet exceeds notify threshold, sent as attachment"
        );
        self.publish(&WireBody::Attachment { attachment_id }).await
    }

    async fn publish(&self, body: &WireBody) -> Result<(), FanoutError> {
        let payload = wire::encode(&self.uid, body)?;
        self.notify(&payload).await
    }

    /// Stamps `last_publish` before sending, so a failed heartbeat is
    /// retried one interval later rather than immediately.
    async fn notify(&self, payload: &str) -> Result<(), FanoutError> {
        match self.last_publish.lock() {
            Ok(mut last) => *last = TokioInstant::now(),
            Err(poisoned) => *poisoned.into_inner() = TokioInstant::now(),
        }
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(FanoutError::transport)?;
        Ok(())
    }

    fn last_publish(&self) -> TokioInstant {
        match self.last_publish.lock() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn next_heartbeat(&self) -> TokioInstant {
        self.last_publish() + self.options.heartbeat_interval
    }

    async fn on_notification(&self, payload: &str) {
        let message = match wire::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed fan-out message");
                return;
            }
        };
        if message.uid == self.uid {
            return;
        }

        if let Ok(mut nodes) = self.nodes.lock() {
            if nodes.touch(&message.uid, Instant::now()) {
                tracing::info!(peer = %message.uid, "Fan-out peer joined");
            }
        }

        match message.body {
            WireBody::InitialHeartbeat => {
                if let Err(e) = self.publish(&WireBody::Heartbeat).await {
                    tracing::warn!(error = %e, "Failed to answer initial heartbeat");
                }
            }
            WireBody::Heartbeat => {
                tracing::trace!(peer = %message.uid, "Heartbeat received");
            }
            WireBody::Broadcast { packet } => self.deliver(packet),
            WireBody::Attachment { attachment_id } => {
                match self.load_attachment(attachment_id).await {
                    Ok(packet) => self.deliver(packet),
                    Err(e) => {
                        tracing::warn!(attachment_id, error = %e, "Failed to load attachment");
                    }
                }
            }
        }
    }

    async fn load_attachment(&self, attachment_id: DbId) -> Result<Packet, FanoutError> {
        let bytes =
            AttachmentRepo::find_payload(&self.pool, &self.options.table_name, attachment_id)
                .await
                .map_err(FanoutError::transport)?
                .ok_or(FanoutError::MissingAttachment(attachment_id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn deliver(&self, packet: Packet) {
        // Zero receivers only means no server relays this adapter yet.
        let _ = self.incoming.send(packet);
    }

    fn live_peers(&self) -> usize {
        match self.nodes.lock() {
            Ok(mut nodes) => {
                for uid in nodes.prune(Instant::now()) {
                    tracing::info!(peer = %uid, "Fan-out peer timed out");
                }
                nodes.len()
            }
            Err(_) => 0,
        }
    }

    /// Runs when the heartbeat deadline `due` passes. Skipped if something
    /// else was published while waiting, since that moved the deadline.
    async fn heartbeat_due(&self, due: TokioInstant) {
        self.live_peers();

        if self.next_heartbeat() > due {
            return;
        }
        if let Err(e) = self.publish(&WireBody::Heartbeat).await {
            tracing::warn!(error = %e, "Failed to publish heartbeat");
        }
    }
}

async fn listen_loop(inner: Arc<Inner>, mut listener: PgListener, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            received = listener.recv() => match received {
                Ok(notification) => inner.on_notification(notification.payload()).await,
                Err(e) => {
                    tracing::error!(error = %e, channel = %inner.channel, "Fan-out listener error");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(LISTEN_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
    tracing::debug!(uid = %inner.uid, "Fan-out listener stopped");
}

async fn heartbeat_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        let due = inner.next_heartbeat();
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep_until(due) => inner.heartbeat_due(due).await,
        }
    }
}

async fn cleanup_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let period = inner.options.cleanup_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match AttachmentRepo::delete_older_than(&inner.pool, &inner.options.table_name, period).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Deleted stale fan-out attachments"),
                    Err(e) => tracing::warn!(error = %e, "Failed to delete stale attachments"),
                }
            }
        }
    }
}
