//! crates/mentorpulse_core/src/presence.rs
//!
//! In-process presence registry. Memory only: it starts empty and is cleared at
//! shutdown, so after a restart nobody is online until they reconnect.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::ports::{ConnectionId, PresenceRegistry};

/// One live connection per user; a newer connection displaces the older one.
#[derive(Default)]
pub struct InMemoryPresence {
    entries: RwLock<HashMap<Uuid, ConnectionId>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn online_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Forgets everyone. Called when the server shuts down.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl PresenceRegistry for InMemoryPresence {
    async fn is_online(&self, user_id: Uuid) -> bool {
        self.entries.read().await.contains_key(&user_id)
    }

    async fn record(&self, user_id: Uuid, connection: ConnectionId) {
        if let Some(previous) = self.entries.write().await.insert(user_id, connection) {
            debug!(%user_id, %previous, %connection, "presence entry displaced");
        }
    }

    async fn remove(&self, user_id: Uuid) {
        self.entries.write().await.remove(&user_id);
    }

    async fn release(&self, user_id: Uuid, connection: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&user_id) {
            Some(current) if *current == connection => {
                entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_remove() {
        let presence = InMemoryPresence::new();
        let user = Uuid::new_v4();
        assert!(!presence.is_online(user).await);

        presence.record(user, ConnectionId::new()).await;
        assert!(presence.is_online(user).await);

        presence.remove(user).await;
        assert!(!presence.is_online(user).await);
    }

    #[tokio::test]
    async fn second_connection_overwrites_first() {
        let presence = InMemoryPresence::new();
        let user = Uuid::new_v4();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        presence.record(user, first).await;
        presence.record(user, second).await;
        assert_eq!(presence.online_count().await, 1);

        // The displaced connection closing must not take the user offline.
        assert!(!presence.release(user, first).await);
        assert!(presence.is_online(user).await);

        assert!(presence.release(user, second).await);
        assert!(!presence.is_online(user).await);
    }

    #[tokio::test]
    async fn clear_forgets_everyone() {
        let presence = InMemoryPresence::new();
        presence.record(Uuid::new_v4(), ConnectionId::new()).await;
        presence.record(Uuid::new_v4(), ConnectionId::new()).await;
        presence.clear().await;
        assert_eq!(presence.online_count().await, 0);
    }
}
