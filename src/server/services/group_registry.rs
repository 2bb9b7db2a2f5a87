//! Live groups and which connections are currently subscribed to them.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::server::models::chat::Group;

#[derive(Default)]
struct RegistryInner {
    groups: HashMap<String, Group>,
    // A connection belongs to at most one group; both maps are mutated under
    // the same lock so `members_of` can never observe a torn state.
    group_by_connection: HashMap<Uuid, String>,
    members: HashMap<String, HashSet<Uuid>>,
}

#[derive(Default)]
pub struct GroupRegistry {
    inner: RwLock<RegistryInner>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent create-or-fetch.
    pub async fn ensure(&self, group_id: &str) -> Group {
        let mut inner = self.inner.write().await;
        inner
            .groups
            .entry(group_id.to_string())
            .or_insert_with(|| Group {
                group_id: group_id.to_string(),
                created_at: Utc::now(),
            })
            .clone()
    }

    /// Records membership, replacing any prior subscription of the
    /// connection.
    pub async fn subscribe(&self, connection_id: Uuid, group_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.group_by_connection.remove(&connection_id) {
            if let Some(members) = inner.members.get_mut(&previous) {
                members.remove(&connection_id);
            }
        }
        inner
            .group_by_connection
            .insert(connection_id, group_id.to_string());
        inner
            .members
            .entry(group_id.to_string())
            .or_default()
            .insert(connection_id);
    }

    /// No-op when the connection was not subscribed.
    pub async fn unsubscribe(&self, connection_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(group_id) = inner.group_by_connection.remove(&connection_id) {
            if let Some(members) = inner.members.get_mut(&group_id) {
                members.remove(&connection_id);
            }
        }
    }

    /// Snapshot of the current subscribers, taken under a single lock
    /// acquisition. Used only for fan-out targeting.
    pub async fn members_of(&self, group_id: &str) -> Vec<Uuid> {
        let inner = self.inner.read().await;
        inner
            .members
            .get(group_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let registry = GroupRegistry::new();
        let first = registry.ensure("g1").await;
        let second = registry.ensure("g1").await;
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn resubscribing_replaces_previous_membership() {
        let registry = GroupRegistry::new();
        let conn = Uuid::new_v4();

        registry.subscribe(conn, "a").await;
        registry.subscribe(conn, "b").await;

        assert!(registry.members_of("a").await.is_empty());
        assert_eq!(registry.members_of("b").await, vec![conn]);
    }

    #[tokio::test]
    async fn unsubscribe_is_a_noop_when_not_subscribed() {
        let registry = GroupRegistry::new();
        let conn = Uuid::new_v4();

        registry.unsubscribe(conn).await;
        registry.subscribe(conn, "a").await;
        registry.unsubscribe(conn).await;
        registry.unsubscribe(conn).await;

        assert!(registry.members_of("a").await.is_empty());
    }
}
