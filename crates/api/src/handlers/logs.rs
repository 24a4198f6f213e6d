use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::AppState;
use engine::LogEntry;

#[derive(Deserialize)]
pub struct TailQuery {
    #[serde(default)]
    pub from: u64,
}

pub async fn tail(
    Path(run_id): Path<String>,
    Query(query): Query<TailQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LogEntry>>, StatusCode> {
    match state.engine.run_log().tail(&run_id, query.from).await {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => {
            error!(%run_id, "failed to read run log: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn stream(
    ws: WebSocketUpgrade,
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_log(socket, state, run_id))
}

/// Push every entry of `run_id` to the socket, from the first one, until
/// the client goes away.
async fn stream_log(socket: WebSocket, state: AppState, run_id: String) {
    let run_log = state.engine.run_log();
    let mut follower = run_log.follow(&run_id, 0);
    info!(%run_id, followers = run_log.follower_count(&run_id), "log stream connected");
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            batch = follower.next_batch() => {
                if !forward(&mut ws_tx, batch).await {
                    break;
                }
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(%run_id, sent = follower.next_seq(), "log stream closed");
}

/// Send a batch; `false` once the connection is gone.
async fn forward(ws_tx: &mut SplitSink<WebSocket, Message>, batch: Vec<LogEntry>) -> bool {
    for entry in batch {
        if ws_tx.send(Message::Text(entry.text)).await.is_err() {
            return false;
        }
    }
    ws_tx.flush().await.is_ok()
}
