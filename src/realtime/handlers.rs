use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{realtime::bus::EventBus, state::AppState};

pub fn realtime_routes() -> Router<AppState> {
    Router::new().route("/realtime", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let events = state.events.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, events))
}

/// Relays bus events to one client until either side goes away.
/// Client frames other than Close are ignored.
async fn handle_connection(socket: WebSocket, events: EventBus) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut rx = events.subscribe();
    info!(%conn_id, listeners = events.listener_count(), "realtime client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!(%conn_id, skipped = n, "realtime client lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%conn_id, error = %e, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
            debug!(%conn_id, "ignoring client frame");
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(%conn_id, "realtime client disconnected");
}
