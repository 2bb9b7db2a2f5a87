use axum::{
    body::Body,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::server::config::AppState;

pub mod handlers;
pub mod transport;
pub mod types;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrades the live channel. Browsers cannot set headers on a WebSocket
/// handshake, so the credential is also accepted as a `token` query
/// parameter.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let credential = query
        .token
        .or_else(|| auth.map(|TypedHeader(Authorization(bearer))| bearer.token().to_string()));

    let Some(credential) = credential else {
        error!("WebSocket upgrade without credential");
        return unauthorized();
    };

    match state.identity.verify(&credential).await {
        Ok(user_id) => {
            info!("WebSocket connection for user: {}", user_id);
            ws.on_upgrade(move |socket| async move {
                let queue_capacity = state.settings.send_queue_capacity;
                state
                    .hub
                    .handle_socket(socket, state.chat.clone(), user_id, queue_capacity)
                    .await;
            })
        }
        Err(_) => {
            error!("WebSocket upgrade with invalid credential");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .body(Body::empty())
        .unwrap()
}
