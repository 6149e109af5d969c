use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use pgsocket_core::error::FanoutError;
use pgsocket_core::packet::Packet;

use crate::state::AppState;
use crate::ws::manager::{Outbound, OutboundReceiver, WsManager};

/// Upgrade `GET {path}` to a WebSocket and register the client locally.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_client(socket, state.ws_manager))
}

/// Encode a packet as the JSON text frame clients receive.
fn packet_message(packet: &Packet) -> Result<Message, FanoutError> {
    Ok(Message::Text(serde_json::to_string(packet)?.into()))
}

fn outbound_frame(item: &Outbound) -> Result<Message, FanoutError> {
    match item {
        Outbound::Packet(packet) => packet_message(packet),
        Outbound::Ping => Ok(Message::Ping(Bytes::new())),
        Outbound::Close => Ok(Message::Close(None)),
    }
}

/// Serve one client until either side closes.
///
/// Clients only listen: inbound frames other than Close are ignored.
async fn run_client(socket: WebSocket, ws_manager: Arc<WsManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let outbound = ws_manager.add(conn_id.clone()).await;
    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_outbound(outbound, sink, conn_id.clone()));

    tokio::select! {
        _ = &mut writer => {}
        () = read_until_closed(stream, &conn_id) => writer.abort(),
    }

    ws_manager.remove(&conn_id).await;
    tracing::info!(conn_id = %conn_id, "WebSocket client disconnected");
}

async fn write_outbound(
    mut outbound: OutboundReceiver,
    mut sink: SplitSink<WebSocket, Message>,
    conn_id: String,
) {
    while let Some(item) = outbound.recv().await {
        let frame = match outbound_frame(&item) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "Dropping packet that failed to encode");
                continue;
            }
        };
        if let Outbound::Packet(packet) = &item {
            tracing::trace!(conn_id = %conn_id, event = %packet.event, "Sending packet");
        }
        if sink.send(frame).await.is_err() {
            tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
            return;
        }
        if item == Outbound::Close {
            return;
        }
    }
}

async fn read_until_closed(mut stream: SplitStream<WebSocket>, conn_id: &str) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => return,
            Ok(Message::Pong(_)) => tracing::trace!(conn_id = %conn_id, "Pong received"),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                return;
            }
        }
    }
}
