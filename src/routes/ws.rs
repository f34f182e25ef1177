use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Extension},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{sink::SinkExt, stream::StreamExt};

use crate::{message::ClientEvent, relay::SharedRelay};

/// Largest inbound websocket frame accepted.
#[derive(Debug, Clone, Copy)]
pub struct WsLimit(pub usize);

pub fn router() -> Router {
    Router::new().route("/chat", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(relay): Extension<SharedRelay>,
    Extension(WsLimit(limit)): Extension<WsLimit>,
) -> impl IntoResponse {
    ws.max_message_size(limit)
        .on_upgrade(move |s| user_ws(s, relay))
}

/* ---------------- per user ---------------- */
async fn user_ws(sock: WebSocket, relay: SharedRelay) {
    let (mut sink, mut stream) = sock.split();
    let (mut session, mut rx) = relay.join().await;
    let conn_id = session.id;

    /* 推送：load_messages 先，之後是 bus 送來的 chat_message */
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(error) => {
                    tracing::error!(%conn_id, %error, "failed to serialize event");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
        // registry let go of us (shutdown): say goodbye
        let _ = sink.send(Message::Close(None)).await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(raw)) => {
                let ClientEvent::ChatMessage(msg) = ClientEvent::parse(&raw);
                relay.handle_inbound(conn_id, msg).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(%conn_id, %error, "websocket read failed");
                break;
            }
        }
    }

    /* 離線 */
    relay.leave(&mut session).await;
    writer.abort();
    tracing::debug!(%conn_id, state = ?session.state(), "session closed");
}
