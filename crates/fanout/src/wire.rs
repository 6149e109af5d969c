//! JSON messages exchanged over the notification channel.
//!
//! Every message carries the sender's `uid` next to a `type` tag:
//!
//! ```json
//! {"uid":"4b1c…","type":"broadcast","packet":{"event":"on_asset_update","data":{}}}
//! ```

use pgsocket_core::error::FanoutError;
use pgsocket_core::packet::Packet;
use pgsocket_core::types::DbId;
use serde::{Deserialize, Serialize};

/// Message body, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBody {
    /// Sent once on startup; peers answer with a [`WireBody::Heartbeat`].
    InitialHeartbeat,
    /// Periodic liveness signal.
    Heartbeat,
    /// A packet small enough to travel inline.
    Broadcast { packet: Packet },
    /// A packet parked in the attachment table.
    Attachment { attachment_id: DbId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub uid: String,
    #[serde(flatten)]
    pub body: WireBody,
}

pub fn encode(uid: &str, body: &WireBody) -> Result<String, FanoutError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        uid: &'a str,
        #[serde(flatten)]
        body: &'a WireBody,
    }
    Ok(serde_json::to_string(&Borrowed { uid, body })?)
}

pub fn decode(payload: &str) -> Result<WireMessage, FanoutError> {
    Ok(serde_json::from_str(payload)?)
}
