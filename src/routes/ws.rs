use axum::{
    Router, routing::get, response::IntoResponse,
    extract::{ws::{WebSocketUpgrade, WebSocket, Message}, Path, Extension},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use crate::{
    error::{AppErr, AppResult, bad},
    registry::Conn,
    state::AppState,
    sync::SyncHub,
    utils::clock::now_ms,
};

pub fn router() -> Router {
    Router::new().route("/ws/:room_id", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    Extension(state): Extension<AppState>,
) -> AppResult<impl IntoResponse> {
    admit(&state, &room).await?;
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |s| session(s, room, hub)))
}

/// Rooms must be created over HTTP before anyone can connect, unless the
/// server runs with implicit rooms.
async fn admit(state: &AppState, room: &str) -> AppResult<()> {
    if room.trim().is_empty() { return Err(bad("empty room id")); }
    if state.config.implicit_rooms || state.store.exists(room).await? {
        return Ok(());
    }
    warn!(room, "connection refused: room does not exist");
    Err(AppErr::NotFound(room.to_owned()))
}

/* ---------------- per connection ---------------- */
async fn session(sock: WebSocket, room: String, hub: SyncHub) {
    let (sink, stream) = sock.split();
    run(sink, stream, room, hub).await;
}

/// Drives one connection until either direction of the transport ends,
/// then runs the disconnect sequence once.
async fn run<S, R, E>(mut sink: S, mut stream: R, room: String, hub: SyncHub)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Send,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = Conn::new(tx);

    /* 寫端：把 outbox 送進 socket */
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() { break; }
        }
    });

    match hub.join(&room, &conn, now_ms()).await {
        Err(e) => warn!(room, conn = %conn.id, error = %e, "join failed"),
        Ok(()) => {
            let reader = async {
                while let Some(Ok(msg)) = stream.next().await {
                    match msg {
                        Message::Text(raw) => {
                            if let Err(e) = hub.dispatch(&room, &conn, &raw, now_ms()).await {
                                warn!(room, conn = %conn.id, error = %e, "action failed");
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            };
            tokio::select! {
                _ = reader      => debug!(room, conn = %conn.id, "socket closed"),
                _ = &mut writer => debug!(room, conn = %conn.id, "send failed"),
            }
        }
    }

    /* 離房 */
    writer.abort();
    hub.leave(&room, conn.id).await;
}
