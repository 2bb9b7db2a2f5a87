use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde_json::{json, Value};
use tracing::info;

use crate::server::config::AppState;
use crate::server::error::ChatError;
use crate::server::models::chat::{HistoryQuery, Message, SendMessageRequest};

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

fn credential(auth: &BearerHeader) -> Option<&str> {
    auth.as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token())
}

/// `GET /groups/{groupId}/messages?after={id}&limit={n}`
///
/// Unknown groups return an empty array, never a 404.
pub async fn get_history(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    auth: BearerHeader,
) -> Result<Json<Vec<Message>>, ChatError> {
    let messages = state
        .chat
        .get_history(&group_id, query.after, query.limit, credential(&auth))
        .await?;
    Ok(Json(messages))
}

/// `POST /groups/{groupId}/messages` with body `{content}` → 201.
pub async fn send_message(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    auth: BearerHeader,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ChatError> {
    let message = state
        .chat
        .send_message(&group_id, credential(&auth), &request.content)
        .await?;
    info!("Created message {} in group {}", message.id, group_id);
    Ok((StatusCode::CREATED, Json(message)))
}

/// Liveness probe; carries no auth.
pub async fn health() -> Json<Value> {
    Json(json!({ "healthy": true }))
}
