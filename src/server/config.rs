use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::server::handlers::chat::{get_history, health, send_message};
use crate::server::services::chat::ChatService;
use crate::server::services::group_registry::GroupRegistry;
use crate::server::services::identity::{HttpIdentity, Identity};
use crate::server::services::message_store::{InMemoryMessageStore, MessageStore};
use crate::server::ws::transport::ConnectionHub;
use crate::server::ws::ws_handler;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub identity_url: String,
    pub send_queue_capacity: usize,
}

impl Settings {
    /// Everything comes from the environment; `.env` is loaded by the
    /// binary before this runs.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            identity_url: std::env::var("IDENTITY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9090".to_string()),
            send_queue_capacity: std::env::var("SEND_QUEUE_CAPACITY")
                .ok()
                .and_then(|c| c.parse().ok())
                .unwrap_or(64),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub hub: Arc<ConnectionHub>,
    pub identity: Arc<dyn Identity>,
    pub settings: Settings,
}

pub fn configure_app(settings: Settings) -> Router {
    let identity: Arc<dyn Identity> = Arc::new(HttpIdentity::new(&settings.identity_url));
    configure_app_with_identity(settings, identity)
}

/// Wires the services together with an injected identity collaborator.
pub fn configure_app_with_identity(settings: Settings, identity: Arc<dyn Identity>) -> Router {
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    let registry = Arc::new(GroupRegistry::new());
    let hub = Arc::new(ConnectionHub::new(registry.clone()));
    let chat = Arc::new(ChatService::new(
        store,
        registry,
        hub.clone(),
        identity.clone(),
    ));

    let state = AppState {
        chat,
        hub,
        identity,
        settings,
    };

    app_router(state)
}

fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/groups/:group_id/messages",
            get(get_history).post(send_message),
        )
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
