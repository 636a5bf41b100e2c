//! WebSocket front door for the room, one JSON event per text frame.

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpListener, select};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::{event::ClientEvent, room::Room};

pub fn app(room: Arc<Room>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(room)
}

pub async fn serve<F>(listener: TcpListener, room: Arc<Room>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(room))
        .with_graceful_shutdown(shutdown)
        .await
        .context("web server failed")
}

async fn ws_handler(ws: WebSocketUpgrade, State(room): State<Arc<Room>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket(socket, room))
}

async fn websocket(socket: WebSocket, room: Arc<Room>) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut outbox) = room.connect();
    debug!(session = %session.id(), "websocket connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(?err, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => room.handle(&mut session, event).await,
                    Err(err) => debug!(session = %session.id(), ?err, "ignoring malformed frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut send_task => break,
        }
    }

    room.disconnect(&mut session).await;
    send_task.abort();
    debug!(session = %session.id(), "websocket disconnected");
}
