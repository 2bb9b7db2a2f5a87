use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::server::services::chat::ChatService;
use crate::server::ws::types::{ClientMessage, ServerEvent};

/// Interprets the frames of one live connection. A malformed or rejected
/// frame gets an error event back; the connection itself stays open.
pub struct ChatHandler {
    chat: Arc<ChatService>,
    tx: mpsc::Sender<String>,
    connection_id: Uuid,
    user_id: String,
}

impl ChatHandler {
    pub fn new(
        chat: Arc<ChatService>,
        tx: mpsc::Sender<String>,
        connection_id: Uuid,
        user_id: String,
    ) -> Self {
        Self {
            chat,
            tx,
            connection_id,
            user_id,
        }
    }

    pub async fn handle_text(
        &mut self,
        text: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => {
                debug!("Malformed frame on {}: {}", self.connection_id, e);
                self.send_event(&ServerEvent::Error {
                    message: format!("malformed frame: {e}"),
                })
                .await
            }
        }
    }

    async fn handle_message(
        &mut self,
        msg: ClientMessage,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match msg {
            ClientMessage::Subscribe { group_id } => {
                match self.chat.join_group(self.connection_id, &group_id).await {
                    Ok(group) => {
                        info!(
                            "User {} subscribed {} to group {}",
                            self.user_id, self.connection_id, group.group_id
                        );
                        self.send_event(&ServerEvent::Subscribed {
                            group_id: group.group_id,
                        })
                        .await
                    }
                    Err(e) => {
                        self.send_event(&ServerEvent::Error {
                            message: e.to_string(),
                        })
                        .await
                    }
                }
            }
            ClientMessage::Unsubscribe => {
                self.chat.leave_group(self.connection_id).await;
                Ok(())
            }
        }
    }

    async fn send_event(
        &self,
        event: &ServerEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let frame = serde_json::to_string(event)?;
        self.tx.send(frame).await?;
        Ok(())
    }
}
