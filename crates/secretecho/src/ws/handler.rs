//! WebSocket handler driving one relay session per client connection.

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::api::{ApiError, AppState};
use crate::auth::CurrentUser;
use crate::companion::CompanionProfile;
use crate::relay::{RelaySession, UpstreamEvent};

/// Size of the per-connection client-bound event buffer.
const CLIENT_BUFFER_SIZE: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub companion_code: String,
}

/// WebSocket upgrade handler.
///
/// GET /ws/chat?companion_code=<code>&token=<jwt>
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    user: CurrentUser,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let profile = state
        .companions
        .get(&query.companion_code)
        .cloned()
        .ok_or_else(|| {
            ApiError::bad_request(format!("Invalid companion code: {}", query.companion_code))
        })?;

    info!(
        "WebSocket upgrade for user {} (companion {})",
        user.user_pid, profile.code
    );

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, user, profile)))
}

enum LoopEvent {
    Client(Option<Result<Message, axum::Error>>),
    Upstream(UpstreamEvent),
}

/// Run the session event loop until either side disconnects.
///
/// All session events are handled here, one at a time; the suspension
/// points (upstream connect, persistence calls) only block this
/// connection's loop.
async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    user: CurrentUser,
    profile: CompanionProfile,
) {
    let (mut sender, mut receiver) = socket.split();

    // Client-bound frames funnel through a channel so the session never
    // touches the socket directly.
    let (client_tx, mut client_rx) = mpsc::channel(CLIENT_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        while let Some(event) = client_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!("failed to serialize client event: {}", err);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let registration = state.relays.register(&user.user_pid, &profile.code);
    let mut session = RelaySession::new(
        user.user_pid.clone(),
        profile,
        state.connector.clone(),
        state.chat.clone(),
        client_tx,
    );

    loop {
        let event = tokio::select! {
            frame = receiver.next() => LoopEvent::Client(frame),
            upstream = session.upstream_event() => LoopEvent::Upstream(upstream),
        };

        match event {
            LoopEvent::Client(Some(Ok(Message::Text(text)))) => {
                let raw = text.to_string();
                session.handle_client_text(&raw).await;
            }
            LoopEvent::Client(Some(Ok(Message::Close(_)))) | LoopEvent::Client(None) => {
                info!("client closed WebSocket for user {}", user.user_pid);
                break;
            }
            LoopEvent::Client(Some(Ok(Message::Binary(_)))) => {
                debug!("ignoring binary frame from user {}", user.user_pid);
            }
            LoopEvent::Client(Some(Ok(_))) => {
                // Ping/pong handled by the protocol layer
            }
            LoopEvent::Client(Some(Err(err))) => {
                warn!("WebSocket error for user {}: {}", user.user_pid, err);
                break;
            }
            LoopEvent::Upstream(event) => {
                session.handle_upstream_event(event).await;
            }
        }
    }

    // Client disconnect cancels the session: the upstream socket closes
    // and queued messages are dropped.
    session.close();
    state.relays.unregister(&registration);
    send_task.abort();
    info!("WebSocket connection closed for user {}", user.user_pid);
}
