//! WebSocket endpoint (`/ws`, §6) — peer classification and the per-peer
//! read/write task split.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::app::AppState;
use crate::handle::Handle;

const OUTBOX_CAPACITY: usize = 64;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let is_game = params.get("role").map(|r| r == "game").unwrap_or(false);
    ws.on_upgrade(move |socket| handle_socket(socket, state, is_game))
}

async fn handle_socket(socket: WebSocket, state: AppState, is_game: bool) {
    let handle = Handle::new();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOX_CAPACITY);

    if is_game {
        state.hub.register_game_source(handle, tx);
    } else {
        state.hub.register_browser(handle, tx);
    }

    // Per-peer write task: draining is independent across peers, so a slow
    // peer can suspend here without stalling anyone else's broadcast.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if is_game {
                    state.hub.handle_game_source_message(handle, &text);
                } else {
                    state.hub.handle_browser_message(handle, &text).await;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.hub.remove_peer(handle);
    writer.abort();
}
