//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the state of one WebSocket connection.

use crate::config::Config;
use crate::web::hub::ConnectionHub;
use mentorpulse_core::ports::{
    ChatRepository, MeetingRoomProvider, MessageRepository, ProgressRepository,
    SessionRepository, SkillRepository, UserRepository,
};
use mentorpulse_core::{
    ChatEngine, ConnectionId, InMemoryPresence, InMemoryStore, SessionEngine, SkillCreditor,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::LinkRoomProvider;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub chat: Arc<ChatEngine>,
    pub sessions: Arc<SessionEngine>,
    pub presence: Arc<InMemoryPresence>,
    pub hub: Arc<ConnectionHub>,
    /// Cancelled when the server starts shutting down; open sockets close on it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires both engines over one store that implements every repository port.
    pub fn assemble<S>(config: Arc<Config>, store: Arc<S>) -> Arc<Self>
    where
        S: UserRepository
            + ChatRepository
            + MessageRepository
            + SessionRepository
            + SkillRepository
            + ProgressRepository
            + 'static,
    {
        let rooms: Arc<dyn MeetingRoomProvider> =
            Arc::new(LinkRoomProvider::new(config.meeting_base_url.clone()));
        Self::assemble_with_rooms(config, store, rooms)
    }

    pub fn assemble_with_rooms<S>(
        config: Arc<Config>,
        store: Arc<S>,
        rooms: Arc<dyn MeetingRoomProvider>,
    ) -> Arc<Self>
    where
        S: UserRepository
            + ChatRepository
            + MessageRepository
            + SessionRepository
            + SkillRepository
            + ProgressRepository
            + 'static,
    {
        let presence = Arc::new(InMemoryPresence::new());
        let hub = Arc::new(ConnectionHub::with_outbox_capacity(config.ws_outbox_capacity));

        let chat = Arc::new(ChatEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            presence.clone(),
            hub.clone(),
        ));
        let sessions = Arc::new(SessionEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            SkillCreditor::new(store.clone()),
            rooms,
            config.credit_policy,
        ));

        Arc::new(Self {
            config,
            users: store,
            chat,
            sessions,
            presence,
            hub,
            shutdown: CancellationToken::new(),
        })
    }

    /// State backed by the in-memory store. Used by tests and when no database is configured.
    pub fn in_memory(config: Config) -> Arc<Self> {
        Self::assemble(Arc::new(config), Arc::new(InMemoryStore::new()))
    }
}

//=========================================================================================
// ConnectionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, authenticated WebSocket connection.
pub struct ConnectionState {
    pub user_id: Uuid,
    pub connection_id: ConnectionId,
    pub joined_chats: HashSet<Uuid>,
}

impl ConnectionState {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            connection_id: ConnectionId::new(),
            joined_chats: HashSet::new(),
        }
    }
}
