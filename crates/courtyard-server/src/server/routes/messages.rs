//! REST message endpoints.
//!
//! Server-initiated broadcasts: portal pages and bots post into a group
//! over plain HTTP. Each handler performs the store write and then pushes
//! the resulting event through the registry, the same control flow as the
//! WebSocket dispatcher. Message edits only exist on this surface — the
//! inbound socket taxonomy has no edit operation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use courtyard_chat::{ChatEvent, MessageStore, OnlineUser, StoreError};

use crate::auth;
use crate::server::AppState;

/// Request body shared by the post and edit endpoints.
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub text: String,
}

/// POST /api/v1/groups/:group_id/messages — append and broadcast.
pub async fn post_message_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let author = authorize(&state, &headers)?;
    if body.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message = state
        .store
        .append_message(&group_id, &author, &body.text)
        .await
        .map_err(store_error_status)?;

    tracing::debug!(group = %group_id, user = %author.email, "Message posted over REST");

    let event = ChatEvent::new_message(message.clone());
    state
        .registry
        .broadcast_to_group(&group_id, &event, None)
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// PUT /api/v1/groups/:group_id/messages/:message_id — edit and broadcast.
pub async fn update_message_handler(
    State(state): State<Arc<AppState>>,
    Path((group_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let author = authorize(&state, &headers)?;
    if body.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message = state
        .store
        .update_message(&group_id, &author.email, &message_id, &body.text)
        .await
        .map_err(store_error_status)?;

    tracing::debug!(group = %group_id, message = %message_id, "Message edited over REST");

    let event = ChatEvent::message_updated(message.clone());
    state
        .registry
        .broadcast_to_group(&group_id, &event, None)
        .await;

    Ok((StatusCode::OK, Json(message)))
}

/// Resolve the caller from a `Authorization: Bearer <token>` header.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<OnlineUser, StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = auth::validate_token(&state.config.token_secret, token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(OnlineUser {
        email: claims.sub,
        name: claims.name,
        avatar: claims.avatar,
    })
}

fn store_error_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::MessageNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::NotAuthor { .. } => StatusCode::FORBIDDEN,
        StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
