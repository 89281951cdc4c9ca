use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::hub::BroadcastHub;

pub fn router(hub: Arc<BroadcastHub>) -> Router {
    Router::new().route("/", get(upgrade)).with_state(hub)
}

/// GET /: upgrade to a WebSocket subscribed to the hub
async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<BroadcastHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, hub))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, hub: Arc<BroadcastHub>) {
    let (id, mut rx) = hub.register();
    info!(subscriber = id, %peer, clients = hub.len(), "websocket client connected");

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            sink.send(Message::Text(payload.to_string())).await?;
        }
        Ok::<_, axum::Error>(())
    });

    let reader_hub = Arc::clone(&hub);
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg? {
                Message::Text(text) => {
                    debug!(%peer, text = %text, "message from client");
                    reader_hub.broadcast(&format!("{text} from {peer}"));
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok::<_, axum::Error>(())
    });

    // Either side finishing ends the connection.
    let outcome = tokio::select! {
        res = &mut writer => {
            reader.abort();
            res
        }
        res = &mut reader => {
            writer.abort();
            res
        }
    };

    hub.unregister(id);
    match outcome {
        Ok(Ok(())) => info!(subscriber = id, %peer, "websocket client disconnected"),
        Ok(Err(e)) => warn!(subscriber = id, %peer, error = %e, "websocket connection failed"),
        Err(e) => warn!(subscriber = id, %peer, error = %e, "websocket task aborted"),
    }
}
