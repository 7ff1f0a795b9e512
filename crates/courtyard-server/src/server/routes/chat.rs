//! WebSocket transport for the chat runtime.
//!
//! One actor per connection. A writer task owns the socket's sink and
//! drains an mpsc queue; the registry-owned [`WsChannel`] pushes into that
//! queue, so a slow socket never blocks a broadcast loop. The reader loop
//! parses inbound JSON events and feeds the dispatcher; when it exits the
//! connection is unregistered.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use courtyard_chat::{
    dispatch_client_event, ChannelError, ChatChannel, ChatEvent, ClientEvent, OnlineUser,
};

use crate::auth;
use crate::server::AppState;

/// Application close codes, mirrored by the web client:
/// 4001 = token expired, 4002 = token invalid, 4003 = replaced by a newer
/// connection from the same resident.
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;
const CLOSE_REPLACED: u16 = 4003;

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Upgrade token issued by the portal's session layer.
    pub token: String,
    /// Group the connection joins.
    pub group: String,
}

/// Registry-owned handle for one WebSocket connection.
///
/// Sends fail fast once the writer task is gone; there is no timeout on a
/// healthy but slow socket — the queue is unbounded by design.
struct WsChannel {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl ChatChannel for WsChannel {
    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.tx
            .send(Message::Text(text.to_string()))
            .map_err(|_| ChannelError::Closed("writer task stopped".to_string()))
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.tx
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_REPLACED,
                reason: "connection replaced".into(),
            })))
            .map_err(|_| ChannelError::Closed("writer task stopped".to_string()))
    }
}

/// GET /ws?token=...&group=...
///
/// WebSocket upgrade endpoint. On auth failure the connection is upgraded
/// and immediately closed with an application close code so the client can
/// tell an expired token from an invalid one.
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match auth::validate_token(&state.config.token_secret, &params.token) {
        Ok(claims) => {
            tracing::info!(
                user = %claims.sub,
                group = %params.group,
                "WebSocket connection authenticated"
            );
            let profile = OnlineUser {
                email: claims.sub,
                name: claims.name,
                avatar: claims.avatar,
            };
            ws.on_upgrade(move |socket| run_connection(socket, state, params.group, profile))
        }
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "token invalid"),
            };

            tracing::warn!(
                close_code = close_code,
                reason = reason,
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |mut socket| async move {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code,
                        reason: reason.into(),
                    })))
                    .await;
            })
        }
    }
}

/// Run the actor for one authenticated connection.
async fn run_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    group_id: String,
    profile: OnlineUser,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let channel = Arc::new(WsChannel { tx });
    state
        .registry
        .connect(&group_id, profile.clone(), channel)
        .await;

    // First frame after registration: the group's presence snapshot.
    let snapshot = ChatEvent::online_users(
        &group_id,
        state.registry.get_online_users(&group_id).await,
    );
    state
        .registry
        .send_to_user(&group_id, &profile.email, &snapshot)
        .await;

    tracing::info!(user = %profile.email, group = %group_id, "WebSocket actor started");

    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    dispatch_client_event(
                        state.registry.as_ref(),
                        state.store.as_ref(),
                        &group_id,
                        &profile,
                        event,
                    )
                    .await;
                }
                Err(e) => {
                    tracing::debug!(
                        user = %profile.email,
                        error = %e,
                        "Malformed client event"
                    );
                    let error = ChatEvent::error(400, "malformed event");
                    state
                        .registry
                        .send_to_user(&group_id, &profile.email, &error)
                        .await;
                }
            },
            Some(Ok(Message::Binary(_))) => {
                tracing::debug!(user = %profile.email, "Ignoring unexpected binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // The protocol layer answers pings; nothing to do here.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(
                    user = %profile.email,
                    reason = ?frame,
                    "Client initiated close"
                );
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    user = %profile.email,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user = %profile.email, "WebSocket stream ended");
                break;
            }
        }
    }

    state.registry.disconnect(&group_id, &profile.email).await;
    writer_handle.abort();

    tracing::info!(user = %profile.email, group = %group_id, "WebSocket actor stopped");
}

/// Writer task: forwards queued messages to the WebSocket sink. Stops after
/// a close frame or when the sink reports a broken connection.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
}
