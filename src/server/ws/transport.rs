use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::server::models::chat::Message;
use crate::server::services::chat::ChatService;
use crate::server::services::group_registry::GroupRegistry;
use crate::server::ws::handlers::chat::ChatHandler;
use crate::server::ws::types::ServerEvent;

struct ConnectionEntry {
    user_id: String,
    tx: mpsc::Sender<String>,
}

/// Owns every live channel and fans events out to the connections
/// subscribed to a group at the moment of delivery.
///
/// Each connection gets one bounded queue feeding its writer task, so
/// delivery is FIFO per connection and a slow or dead consumer costs only
/// its own queue, never the publisher or the other subscribers.
pub struct ConnectionHub {
    connections: RwLock<HashMap<Uuid, ConnectionEntry>>,
    registry: Arc<GroupRegistry>,
}

impl ConnectionHub {
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            registry,
        }
    }

    /// Registers a connection; it belongs to no group yet.
    pub async fn connect(&self, connection_id: Uuid, user_id: String, tx: mpsc::Sender<String>) {
        info!("Connection {} opened for user {}", connection_id, user_id);
        self.connections
            .write()
            .await
            .insert(connection_id, ConnectionEntry { user_id, tx });
    }

    /// Unsubscribes and releases the connection's resources. Safe to call
    /// more than once.
    pub async fn disconnect(&self, connection_id: Uuid) {
        self.registry.unsubscribe(connection_id).await;
        if let Some(entry) = self.connections.write().await.remove(&connection_id) {
            info!(
                "Connection {} closed for user {}",
                connection_id, entry.user_id
            );
        }
    }

    pub async fn subscribe(&self, connection_id: Uuid, group_id: &str) {
        self.registry.subscribe(connection_id, group_id).await;
    }

    pub async fn unsubscribe(&self, connection_id: Uuid) {
        self.registry.unsubscribe(connection_id).await;
    }

    /// Delivers `message` to every current subscriber of the group. Returns
    /// how many queues accepted it. Best-effort per connection: a full or
    /// closed queue drops that one delivery, and closed connections are
    /// cleaned up before returning.
    pub async fn publish(&self, group_id: &str, message: &Message) -> usize {
        let members = self.registry.members_of(group_id).await;
        if members.is_empty() {
            return 0;
        }

        let event = match serde_json::to_string(&ServerEvent::Message {
            payload: message.clone(),
        }) {
            Ok(event) => event,
            Err(e) => {
                error!("Failed to serialize message event: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let connections = self.connections.read().await;
            for connection_id in members {
                let Some(entry) = connections.get(&connection_id) else {
                    continue;
                };
                match entry.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            "Dropping message {} for slow connection {}",
                            message.id, connection_id
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!(
                            "Dropping message {} for closed connection {}",
                            message.id, connection_id
                        );
                        dead.push(connection_id);
                    }
                }
            }
        }
        for connection_id in dead {
            self.disconnect(connection_id).await;
        }
        delivered
    }

    /// Runs one WebSocket connection to completion: a reader half feeding
    /// the frame handler and a writer half draining the connection's queue.
    /// Teardown runs whichever way the connection ends.
    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        chat: Arc<ChatService>,
        user_id: String,
        queue_capacity: usize,
    ) {
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<String>(queue_capacity);

        let connection_id = Uuid::new_v4();
        self.connect(connection_id, user_id.clone(), tx.clone()).await;

        let mut handler = ChatHandler::new(chat, tx, connection_id, user_id);
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    WsMessage::Text(text) => {
                        if let Err(e) = handler.handle_text(&text).await {
                            error!("Error handling frame on {}: {}", connection_id, e);
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        });

        let mut send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(WsMessage::Text(msg)).await.is_err() {
                    break;
                }
            }
        });

        // Whichever half finishes first, normally or not, takes the other
        // down with it; the disconnect below must run in every case.
        tokio::select! {
            _ = &mut recv_task => send_task.abort(),
            _ = &mut send_task => recv_task.abort(),
        }

        self.disconnect(connection_id).await;
    }
}
