//! services/api/src/web/hub.rs
//!
//! The in-process connection registry behind the WebSocket fan-out.
//!
//! Every connection owns a bounded outbox channel drained by its writer task. A
//! user's room is the set of their live connections; a chat room is the set of
//! connections that joined it. Pushes to a connection whose outbox is gone or
//! full are dropped, never queued.

use async_trait::async_trait;
use mentorpulse_core::{Audience, ChatEvent, ConnectionId, EventPublisher, PortResult};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::web::protocol::ServerMessage;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

pub type Outbox = mpsc::Receiver<ServerMessage>;

struct Connection {
    user_id: Uuid,
    sender: mpsc::Sender<ServerMessage>,
    chats: HashSet<Uuid>,
}

impl Connection {
    /// Hands the message to the writer without waiting. A stalled writer loses it.
    fn push(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %id, user_id = %self.user_id, "outbox full, dropping push");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Connection>,
    chat_rooms: HashMap<Uuid, HashSet<ConnectionId>>,
}

pub struct ConnectionHub {
    state: RwLock<HubState>,
    outbox_capacity: usize,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::with_outbox_capacity(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// `capacity` is clamped to at least one slot.
    pub fn with_outbox_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            outbox_capacity: capacity.max(1),
        }
    }

    /// Adds a connection to its user's room and returns the outbox its writer drains.
    pub async fn register(&self, connection: ConnectionId, user_id: Uuid) -> Outbox {
        let (sender, outbox) = mpsc::channel(self.outbox_capacity);
        self.state.write().await.connections.insert(
            connection,
            Connection {
                user_id,
                sender,
                chats: HashSet::new(),
            },
        );
        outbox
    }

    /// Drops the connection from every room. Its outbox closes once this returns.
    pub async fn unregister(&self, connection: ConnectionId) {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(removed) = state.connections.remove(&connection) else {
            return;
        };
        for chat_id in removed.chats {
            if let Some(room) = state.chat_rooms.get_mut(&chat_id) {
                room.remove(&connection);
                if room.is_empty() {
                    state.chat_rooms.remove(&chat_id);
                }
            }
        }
    }

    pub async fn join_chat(&self, connection: ConnectionId, chat_id: Uuid) -> bool {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(conn) = state.connections.get_mut(&connection) else {
            return false;
        };
        conn.chats.insert(chat_id);
        state.chat_rooms.entry(chat_id).or_default().insert(connection);
        true
    }

    pub async fn leave_chat(&self, connection: ConnectionId, chat_id: Uuid) {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(conn) = state.connections.get_mut(&connection) {
            conn.chats.remove(&chat_id);
        }
        if let Some(room) = state.chat_rooms.get_mut(&chat_id) {
            room.remove(&connection);
            if room.is_empty() {
                state.chat_rooms.remove(&chat_id);
            }
        }
    }

    /// Sends directly to one connection. Returns whether it was handed over.
    pub async fn send_to(&self, connection: ConnectionId, message: ServerMessage) -> bool {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection)
            .map(|conn| conn.push(connection, message))
            .unwrap_or(false)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Closes every outbox, which ends every writer task.
    pub async fn close_all(&self) {
        let mut state = self.state.write().await;
        state.connections.clear();
        state.chat_rooms.clear();
    }

    fn targets(state: &HubState, audience: Audience) -> Vec<ConnectionId> {
        match audience {
            Audience::User(user_id) => state
                .connections
                .iter()
                .filter(|(_, conn)| conn.user_id == user_id)
                .map(|(id, _)| *id)
                .collect(),
            Audience::Chat(chat_id) => state
                .chat_rooms
                .get(&chat_id)
                .map(|room| room.iter().copied().collect())
                .unwrap_or_default(),
            Audience::ChatExcept { chat_id, user_id } => state
                .chat_rooms
                .get(&chat_id)
                .map(|room| {
                    room.iter()
                        .copied()
                        .filter(|id| {
                            state
                                .connections
                                .get(id)
                                .is_some_and(|conn| conn.user_id != user_id)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl EventPublisher for ConnectionHub {
    async fn publish(&self, audience: Audience, event: ChatEvent) -> PortResult<usize> {
        let message = ServerMessage::from(event);
        let state = self.state.read().await;
        let mut handed_over = 0;
        for id in Self::targets(&state, audience) {
            if let Some(conn) = state.connections.get(&id) {
                if conn.push(id, message.clone()) {
                    handed_over += 1;
                }
            }
        }
        if handed_over == 0 {
            debug!(?audience, "push had no live connection");
        }
        Ok(handed_over)
    }
}
