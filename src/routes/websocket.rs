use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{services::broadcast::Topic, AppState};

#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// Optional access token, used only to label the connection in logs.
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Response {
    let observer = params
        .token
        .as_deref()
        .and_then(|t| state.auth.verify(t).ok())
        .map(|u| u.username)
        .unwrap_or_else(|| "anonymous".to_string());
    let topic = state.topic.clone();

    ws.on_upgrade(move |socket| handle_socket(socket, topic, observer))
}

/// Server-push only: inbound frames other than Close are ignored (pings are
/// answered by the WebSocket layer).
async fn handle_socket(mut socket: WebSocket, topic: Arc<Topic>, observer: String) {
    let Some(mut subscription) = topic.subscribe() else {
        info!("WebSocket refused, topic {} closed", topic.name());
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    let id = subscription.id();
    info!("WebSocket connected: {id}, observer={observer}, topic={}", topic.name());

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&*event) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("WebSocket {id}: failed to encode event: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    // Leave the topic before the socket is released.
    drop(subscription);
    let _ = sender.send(Message::Close(None)).await;
    info!("WebSocket disconnected: {id} from topic {}", topic.name());
}
