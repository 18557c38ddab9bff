use crate::api::AppState;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use token_pulse_core::broadcast::{PriceUpdateFrame, Snapshot};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, error, warn};

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let updates = state.hub.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, updates))
}

async fn handle_socket(socket: WebSocket, mut updates: broadcast::Receiver<Snapshot>) {
    let (mut sender, mut receiver) = socket.split();
    debug!("Price-update subscriber connected");

    // Push every snapshot to the client
    let mut send_task = tokio::spawn(async move {
        loop {
            let snapshot = match updates.recv().await {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, skipped {} snapshots", skipped);
                    match drain_to_latest(&mut updates) {
                        Some(snapshot) => snapshot,
                        None => continue,
                    }
                }
                Err(RecvError::Closed) => break,
            };

            let frame = match serde_json::to_string(&PriceUpdateFrame::new(&snapshot)) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode price update: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Inbound messages carry nothing; only watch for the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    debug!("Price-update subscriber disconnected");
}

/// Only the newest snapshot matters to a client that fell behind.
fn drain_to_latest(updates: &mut broadcast::Receiver<Snapshot>) -> Option<Snapshot> {
    let mut latest = None;
    loop {
        match updates.try_recv() {
            Ok(snapshot) => latest = Some(snapshot),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return latest,
        }
    }
}
