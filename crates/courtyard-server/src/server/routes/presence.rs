//! REST presence queries.
//!
//! Portal pages show who is online in a group without opening a WebSocket;
//! this route serves the registry snapshot over plain HTTP.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};

use courtyard_chat::OnlineUser;

use crate::server::AppState;

/// GET /api/v1/groups/:group_id/online — current presence snapshot.
/// An unknown group yields an empty list, not an error.
pub async fn online_users_handler(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Json<Vec<OnlineUser>> {
    Json(state.registry.get_online_users(&group_id).await)
}
