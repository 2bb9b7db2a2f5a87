//! Append-only per-group message log.
//!
//! The store is behind a trait so the backing engine stays swappable; the
//! default implementation keeps everything in memory. Sequence ids are
//! assigned under a per-group lock, so concurrent senders to one group get a
//! gap-free, duplicate-free id sequence while unrelated groups never contend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::server::models::chat::Message;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Assigns the next sequence id for the group and persists the message
    /// atomically. Content validation happens in the service layer; the
    /// store only sequences and stores.
    async fn append(
        &self,
        group_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message, StoreError>;

    /// Messages with `id > after_id`, ascending, at most `limit`. An unknown
    /// group has no history and yields an empty vec, not an error.
    async fn list_since(
        &self,
        group_id: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;
}

#[derive(Default)]
struct GroupLog {
    // Index i holds the message with id i + 1, so the Vec itself guarantees
    // the gap-free invariant.
    messages: Mutex<Vec<Message>>,
}

/// In-memory `MessageStore`. The outer lock is held only long enough to
/// locate or create a group's log; appends and reads serialize on the
/// per-group mutex, which makes reads linearizable within a group.
#[derive(Default)]
pub struct InMemoryMessageStore {
    groups: RwLock<HashMap<String, Arc<GroupLog>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn log_for(&self, group_id: &str) -> Arc<GroupLog> {
        if let Some(log) = self.groups.read().await.get(group_id) {
            return log.clone();
        }
        let mut groups = self.groups.write().await;
        groups.entry(group_id.to_string()).or_default().clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(
        &self,
        group_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<Message, StoreError> {
        let log = self.log_for(group_id).await;
        let mut messages = log.messages.lock().await;
        let message = Message {
            id: messages.len() as i64 + 1,
            group_id: group_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn list_since(
        &self,
        group_id: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let log = match self.groups.read().await.get(group_id) {
            Some(log) => log.clone(),
            None => return Ok(Vec::new()),
        };
        let messages = log.messages.lock().await;
        let start = after_id.clamp(0, messages.len() as i64) as usize;
        Ok(messages[start..].iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn concurrent_appends_assign_gapless_ids() {
        let store = Arc::new(InMemoryMessageStore::new());

        let mut handles = Vec::new();
        for sender in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for n in 0..25 {
                    let msg = store
                        .append("general", &format!("user-{sender}"), &format!("msg {n}"))
                        .await
                        .unwrap();
                    ids.push(msg.id);
                }
                ids
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.extend(handle.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=200).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn list_since_respects_bounds() {
        let store = InMemoryMessageStore::new();
        for n in 0..5 {
            store.append("g", "alice", &format!("m{n}")).await.unwrap();
        }

        let page = store.list_since("g", 2, 2).await.unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 4]);

        // Nothing at or below the cursor, ascending order overall.
        let all = store.list_since("g", 0, 100).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

        // Cursor past the end is not an error.
        assert!(store.list_since("g", 99, 10).await.unwrap().is_empty());
        assert!(store.list_since("g", -3, 1).await.unwrap()[0].id == 1);
    }

    #[tokio::test]
    async fn unknown_group_has_empty_history() {
        let store = InMemoryMessageStore::new();
        assert!(store.list_since("nope", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn groups_sequence_independently() {
        let store = InMemoryMessageStore::new();
        store.append("a", "alice", "hi").await.unwrap();
        store.append("a", "alice", "ho").await.unwrap();
        let first_in_b = store.append("b", "bob", "hey").await.unwrap();
        assert_eq!(first_in_b.id, 1);
    }
}
