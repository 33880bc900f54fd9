//! WebSocket stream of fleet events

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, error, info, warn};

use super::state::ApiState;
use crate::actors::messages::{FleetEvent, FleetSnapshot};

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Serve one viewer: the initial snapshot first, then every published
/// event until either side goes away.
async fn handle_socket(socket: WebSocket, state: ApiState) {
    info!("viewer attached ({} already watching)", state.broadcaster.viewer_count());

    // subscribe before the snapshot so no update published in between is lost
    let mut events = state.broadcaster.subscribe();
    let (mut sender, mut receiver) = socket.split();

    match FleetSnapshot::capture(state.store.as_ref(), state.stats_window).await {
        Ok(snapshot) => {
            if send_event(&mut sender, &FleetEvent::Initial(snapshot)).await.is_err() {
                debug!("viewer left before the initial snapshot");
                return;
            }
        }
        Err(e) => error!("failed to capture initial snapshot: {e}"),
    }

    // pongs are answered from the send half
    let (pong_tx, mut pong_rx) = mpsc::channel::<()>(8);

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if send_event(&mut sender, &event).await.is_err() {
                            debug!("WebSocket send failed, viewer disconnected");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("viewer lagging, skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("broadcast channel closed");
                        break;
                    }
                },
                Some(()) = pong_rx.recv() => {
                    if sender.send(Message::Text("pong".to_string())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) if text.trim() == "ping" => {
                    if pong_tx.send(()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("viewer detached");
}

async fn send_event<S>(sender: &mut S, event: &FleetEvent) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|e| {
        error!("failed to serialize fleet event: {e}");
    })?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}
