//! Orchestration over the store, the registry, and the connection hub.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::server::error::ChatError;
use crate::server::models::chat::{Group, Message};
use crate::server::services::group_registry::GroupRegistry;
use crate::server::services::identity::Identity;
use crate::server::services::message_store::{MessageStore, StoreError};
use crate::server::ws::transport::ConnectionHub;

const DEFAULT_HISTORY_LIMIT: usize = 100;
const MAX_HISTORY_LIMIT: usize = 1000;
const MAX_GROUP_ID_BYTES: usize = 128;

pub struct ChatService {
    store: Arc<dyn MessageStore>,
    registry: Arc<GroupRegistry>,
    hub: Arc<ConnectionHub>,
    identity: Arc<dyn Identity>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<GroupRegistry>,
        hub: Arc<ConnectionHub>,
        identity: Arc<dyn Identity>,
    ) -> Self {
        Self {
            store,
            registry,
            hub,
            identity,
        }
    }

    /// History fetch. An unknown group has no history and yields an empty
    /// list, never an error.
    pub async fn get_history(
        &self,
        group_id: &str,
        after: i64,
        limit: Option<usize>,
        credential: Option<&str>,
    ) -> Result<Vec<Message>, ChatError> {
        let user_id = self.verify(credential).await?;
        validate_group_id(group_id)?;

        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        debug!("History request by {} for group {}", user_id, group_id);
        Ok(self.store.list_since(group_id, after, limit).await?)
    }

    /// Validates, appends, then fans out. The caller gets the stored message
    /// back regardless of fan-out outcome; once the append commits, delivery
    /// problems are the hub's to log.
    pub async fn send_message(
        &self,
        group_id: &str,
        credential: Option<&str>,
        content: &str,
    ) -> Result<Message, ChatError> {
        let sender_id = self.verify(credential).await?;
        validate_group_id(group_id)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidInput("content must not be empty".into()));
        }

        self.registry.ensure(group_id).await;
        let message = self.store.append(group_id, &sender_id, content).await?;
        info!(
            "Stored message {} in group {} from {}",
            message.id, group_id, sender_id
        );

        let delivered = self.hub.publish(group_id, &message).await;
        debug!(
            "Fanned message {} out to {} subscriber(s) of {}",
            message.id, delivered, group_id
        );

        Ok(message)
    }

    /// Ensures the group exists and moves the connection's single
    /// subscription onto it.
    pub async fn join_group(
        &self,
        connection_id: Uuid,
        group_id: &str,
    ) -> Result<Group, ChatError> {
        validate_group_id(group_id)?;
        let group = self.registry.ensure(group_id).await;
        self.hub.subscribe(connection_id, group_id).await;
        Ok(group)
    }

    pub async fn leave_group(&self, connection_id: Uuid) {
        self.hub.unsubscribe(connection_id).await;
    }

    async fn verify(&self, credential: Option<&str>) -> Result<String, ChatError> {
        match credential {
            Some(credential) => self.identity.verify(credential).await,
            None => Err(ChatError::Unauthorized),
        }
    }
}

fn validate_group_id(group_id: &str) -> Result<(), ChatError> {
    let trimmed = group_id.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidInput("group id must not be empty".into()));
    }
    if group_id.len() > MAX_GROUP_ID_BYTES {
        return Err(ChatError::InvalidInput("group id too long".into()));
    }
    if group_id.chars().any(char::is_control) {
        return Err(ChatError::InvalidInput(
            "group id must not contain control characters".into(),
        ));
    }
    Ok(())
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        warn!("Message store failure: {}", e);
        Self::StoreUnavailable
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::server::services::message_store::InMemoryMessageStore;

    struct StaticIdentity(HashMap<String, String>);

    #[async_trait]
    impl Identity for StaticIdentity {
        async fn verify(&self, credential: &str) -> Result<String, ChatError> {
            self.0.get(credential).cloned().ok_or(ChatError::Unauthorized)
        }
    }

    fn service() -> (ChatService, Arc<ConnectionHub>) {
        let registry = Arc::new(GroupRegistry::new());
        let hub = Arc::new(ConnectionHub::new(registry.clone()));
        let identity = StaticIdentity(HashMap::from([(
            "alice-token".to_string(),
            "alice".to_string(),
        )]));
        let chat = ChatService::new(
            Arc::new(InMemoryMessageStore::new()),
            registry,
            hub.clone(),
            Arc::new(identity),
        );
        (chat, hub)
    }

    #[tokio::test]
    async fn first_message_gets_id_one_and_shows_up_in_history() {
        let (chat, _hub) = service();

        let sent = chat
            .send_message("g1", Some("alice-token"), "hi")
            .await
            .unwrap();
        assert_eq!(sent.id, 1);
        assert_eq!(sent.group_id, "g1");
        assert_eq!(sent.sender_id, "alice");
        assert_eq!(sent.content, "hi");

        let history = chat
            .get_history("g1", 0, Some(10), Some("alice-token"))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, sent.id);
    }

    #[tokio::test]
    async fn empty_content_stores_and_publishes_nothing() {
        let (chat, hub) = service();

        let conn = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        hub.connect(conn, "bob".into(), tx).await;
        chat.join_group(conn, "g1").await.unwrap();

        let result = chat.send_message("g1", Some("alice-token"), "   ").await;
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));

        let history = chat
            .get_history("g1", 0, None, Some("alice-token"))
            .await
            .unwrap();
        assert!(history.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_credential_is_unauthorized() {
        let (chat, _hub) = service();

        let send = chat.send_message("g1", Some("bogus"), "hi").await;
        assert!(matches!(send, Err(ChatError::Unauthorized)));

        let history = chat.get_history("g1", 0, None, None).await;
        assert!(matches!(history, Err(ChatError::Unauthorized)));
    }

    #[tokio::test]
    async fn malformed_group_ids_are_rejected() {
        let (chat, _hub) = service();

        for group_id in ["", "   ", "bad\nid", &"g".repeat(200)] {
            let result = chat
                .send_message(group_id, Some("alice-token"), "hi")
                .await;
            assert!(matches!(result, Err(ChatError::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn history_of_unknown_group_is_empty() {
        let (chat, _hub) = service();
        let history = chat
            .get_history("never-seen", 0, None, Some("alice-token"))
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn sent_messages_reach_current_subscribers() {
        let (chat, hub) = service();

        let conn = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        hub.connect(conn, "bob".into(), tx).await;
        chat.join_group(conn, "g1").await.unwrap();

        chat.send_message("g1", Some("alice-token"), "hello")
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        let event: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(event["type"], "message");
        assert_eq!(event["payload"]["groupId"], "g1");
    }
}
