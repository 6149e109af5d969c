//! Tuning knobs for a fan-out strategy.

use std::time::Duration;

use crate::error::FanoutError;

/// Largest payload, in bytes, Postgres accepts in a single `NOTIFY`. The
/// server rejects anything of 8000 bytes or more.
pub const MAX_NOTIFY_PAYLOAD: usize = 7999;

/// Heartbeat interval used by [`FanoutOptions::low_write`] (2 hours).
pub const LOW_WRITE_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2 * 60 * 60 * 1000);

/// Heartbeat timeout used by [`FanoutOptions::low_write`] (2 hours 2 minutes).
pub const LOW_WRITE_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis((2 * 60 + 2) * 60 * 1000);

/// Options recognised by fan-out strategies.
///
/// Defaults mirror a chatty cluster: a heartbeat every 5 seconds and peers
/// dropped after 10 seconds of silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutOptions {
    /// Prefix of the notification channel (default: `socket.io`).
    pub channel_prefix: String,
    /// Namespace appended to the channel name (default: `/`).
    pub namespace: String,
    /// Table holding payloads too large for a single notification.
    pub table_name: String,
    /// Largest encoded size, in bytes, sent inline; anything bigger is
    /// stored as an attachment.
    pub payload_threshold: usize,
    /// How often stale attachments are deleted, and how old they must be.
    pub cleanup_interval: Duration,
    /// How often a node announces it is alive.
    pub heartbeat_interval: Duration,
    /// How long a silent peer is still counted as alive.
    pub heartbeat_timeout: Duration,
}

impl Default for FanoutOptions {
    fn default() -> Self {
        Self {
            channel_prefix: "socket.io".to_string(),
            namespace: "/".to_string(),
            table_name: "socket_io_attachments".to_string(),
            payload_threshold: MAX_NOTIFY_PAYLOAD,
            cleanup_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(10),
        }
    }
}

impl FanoutOptions {
    /// Options for a Postgres-backed cluster where every `pg_notify` costs a
    /// WAL write: heartbeats every 2 hours instead of every 5 seconds.
    ///
    /// Peers that die are noticed roughly two hours later.
    pub fn low_write() -> Self {
        Self {
            heartbeat_interval: LOW_WRITE_HEARTBEAT_INTERVAL,
            heartbeat_timeout: LOW_WRITE_HEARTBEAT_TIMEOUT,
            ..Self::default()
        }
    }

    /// Name of the notification channel, e.g. `socket.io#/`.
    pub fn channel(&self) -> String {
        format!("{}#{}", self.channel_prefix, self.namespace)
    }

    /// Reject options that would produce invalid SQL or oversized notifications.
    pub fn validate(&self) -> Result<(), FanoutError> {
        if self.channel_prefix.is_empty() {
            return Err(FanoutError::InvalidOption(
                "channel_prefix must not be empty".into(),
            ));
        }
        if !is_sql_identifier(&self.table_name) {
            return Err(FanoutError::InvalidOption(format!(
                "table_name '{}' is not a plain SQL identifier",
                self.table_name
            )));
        }
        if self.payload_threshold == 0 || self.payload_threshold > MAX_NOTIFY_PAYLOAD {
            return Err(FanoutError::InvalidOption(format!(
                "payload_threshold must be between 1 and {MAX_NOTIFY_PAYLOAD}"
            )));
        }
        if self.heartbeat_interval.is_zero() || self.cleanup_interval.is_zero() {
            return Err(FanoutError::InvalidOption(
                "intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, max 63 bytes (Postgres `NAMEDATALEN - 1`).
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
