//! Progress streaming over WebSocket.
//!
//! A subscriber first receives a replay of every event persisted so far,
//! then live events until the process's finished flag is set. The small
//! window where an event lands in both the replay and the live stream is
//! accepted; clients deduplicate or tolerate it.

use std::collections::HashMap;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};

use super::SharedState;

pub async fn progress_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<SharedState>,
) -> Response {
    let Some(process_id) = params.get("id").filter(|id| !id.is_empty()).cloned() else {
        tracing::error!("progress subscription without a process id");
        return (StatusCode::BAD_REQUEST, "missing id query parameter").into_response();
    };
    let ws = ws
        .write_buffer_size(state.config.websocket.write_buffer_size)
        .max_message_size(state.config.websocket.read_buffer_size.max(1024));
    ws.on_upgrade(move |socket| handle_socket(socket, state, process_id))
}

async fn handle_socket(socket: WebSocket, state: SharedState, process_id: String) {
    // Register before the replay so no live event can fall in between.
    let (token, mut rx) = state.bus.subscribe(&process_id);
    let (mut sender, mut receiver) = socket.split();

    let handshake_timeout = state.config.websocket.handshake_timeout;
    let replay = replay_persisted(&mut sender, &state, &process_id);
    let replay_ok = if handshake_timeout.is_zero() {
        replay.await
    } else {
        match tokio::time::timeout(handshake_timeout, replay).await {
            Ok(ok) => ok,
            Err(_) => {
                tracing::error!(%process_id, "subscriber too slow draining the replay");
                false
            }
        }
    };
    if !replay_ok {
        state.bus.unsubscribe(&process_id, token);
        return;
    }

    loop {
        match state.store.is_finished(&process_id).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => {
                tracing::error!(%err, "error checking process status");
            }
        }
        tokio::select! {
            // ── Live progress events ────────────────────────────────
            payload = rx.recv() => {
                match payload {
                    Some(payload) => {
                        let text = String::from_utf8_lossy(&payload).into_owned();
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // ── Client messages (close, etc.) ───────────────────────
            client = receiver.next() => {
                match client {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.bus.unsubscribe(&process_id, token);
    let _ = sender.send(Message::Close(None)).await;
}

/// Send every persisted event in order. Returns false when the socket died.
async fn replay_persisted(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &SharedState,
    process_id: &str,
) -> bool {
    let events = match state.store.list(process_id).await {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(%err, "error reading persisted progress");
            return true;
        }
    };
    for event in events {
        let Ok(payload) = serde_json::to_string(&event) else {
            continue;
        };
        if sender.send(Message::Text(payload.into())).await.is_err() {
            return false;
        }
    }
    true
}
