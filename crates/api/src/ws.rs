//! WebSocket endpoint relaying collaboration events through the hub.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use codehive_collab::{ClientEvent, ServerEvent};
use codehive_core::ConnectionId;

use crate::app::AppServices;

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Extension(services): Extension<Arc<AppServices>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, services))
}

async fn handle_connection(socket: WebSocket, services: Arc<AppServices>) {
    let connection_id = ConnectionId::new();
    let (mut sink, mut stream) = socket.split();

    // The hub pushes into this channel; one task drains it into the socket,
    // which keeps per-connection delivery FIFO.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    info!(%connection_id, "websocket connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to encode server event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => dispatch_client_event(&services, connection_id, &tx, event),
                Err(e) => {
                    debug!(%connection_id, error = %e, "ignoring unparseable client event");
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    services.hub().disconnect(connection_id);
    send_task.abort();
    info!(%connection_id, "websocket disconnected");
}

fn dispatch_client_event(
    services: &AppServices,
    connection_id: ConnectionId,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinWorkspace {
            workspace_id,
            user_id,
        } => {
            services
                .hub()
                .join(workspace_id, connection_id, tx.clone(), user_id);
        }
        ClientEvent::FileChange {
            workspace_id,
            delta,
            version,
        } => {
            services
                .hub()
                .content_change(workspace_id, connection_id, delta, version);
        }
        ClientEvent::CursorUpdate {
            workspace_id,
            user_id,
            position,
        } => {
            services
                .hub()
                .cursor_update(workspace_id, connection_id, user_id, position);
        }
    }
}
