//! crates/mentorpulse_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or sockets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::domain::{
    Chat, ChatEvent, Message, Progress, Role, Session, Skill, User, UserCredentials,
};
use crate::skills::CreditSource;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Repository Ports (one per entity)
//=========================================================================================

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        name: &str,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves an unexpired token to its user.
    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, token: &str) -> PortResult<()>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// The active chat for a canonical participant pair, if any.
    async fn find_active_chat(&self, participants: [Uuid; 2]) -> PortResult<Option<Chat>>;

    /// Fails with `PortError::Conflict` if an active chat already exists for the pair.
    async fn insert_chat(&self, chat: &Chat) -> PortResult<()>;

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat>;

    /// Active chats containing `user_id`, most recently updated first.
    async fn list_active_chats_for_user(&self, user_id: Uuid) -> PortResult<Vec<Chat>>;

    async fn set_last_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: &Message) -> PortResult<()>;

    async fn get_message(&self, message_id: Uuid) -> PortResult<Message>;

    /// A window of a chat's history in chronological order. `skip` counts back
    /// from the newest message.
    async fn list_messages(&self, chat_id: Uuid, skip: u64, limit: u64)
        -> PortResult<Vec<Message>>;

    async fn count_messages(&self, chat_id: Uuid) -> PortResult<u64>;

    /// Messages in the chat from other senders that `reader` has no receipt for.
    async fn count_unread(&self, chat_id: Uuid, reader: Uuid) -> PortResult<u64>;

    /// Sets `is_delivered`. Returns `true` only if this call flipped it.
    async fn mark_delivered(&self, message_id: Uuid, at: DateTime<Utc>) -> PortResult<bool>;

    /// Flips every undelivered message in `chat_ids` not sent by `recipient`
    /// and returns exactly the messages this call flipped.
    async fn deliver_pending(
        &self,
        chat_ids: &[Uuid],
        recipient: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<Vec<Message>>;

    /// Appends a read receipt for `reader` on every message in the chat from
    /// someone else that lacks one (restricted to `message_ids` when given),
    /// sets `is_seen`, and returns exactly the messages this call changed.
    async fn mark_seen(
        &self,
        chat_id: Uuid,
        reader: Uuid,
        message_ids: Option<&[Uuid]>,
        at: DateTime<Utc>,
    ) -> PortResult<Vec<Message>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: &Session) -> PortResult<()>;

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session>;

    /// Overwrites the stored session document.
    async fn update_session(&self, session: &Session) -> PortResult<()>;

    /// Sessions where the user is mentor or mentee, ordered by date.
    async fn list_sessions_for_user(&self, user_id: Uuid) -> PortResult<Vec<Session>>;
}

#[async_trait]
pub trait SkillRepository: Send + Sync {
    /// Credits `source` to the user's skill with the same (case-insensitive) name,
    /// or stores `fresh` when there is none yet. Returns the skill as stored.
    /// The lookup and the increment are one atomic step, so concurrent credits all land.
    async fn credit_skill(&self, fresh: &Skill, source: CreditSource) -> PortResult<Skill>;

    async fn list_skills_for_user(&self, user_id: Uuid) -> PortResult<Vec<Skill>>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn append_progress(&self, entry: &Progress) -> PortResult<()>;

    async fn list_progress_for_user(&self, user_id: Uuid) -> PortResult<Vec<Progress>>;
}

//=========================================================================================
// Real-time Ports
//=========================================================================================

/// Identifies one live real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who is connected right now.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    async fn is_online(&self, user_id: Uuid) -> bool;

    /// Records `connection` as the user's live connection, displacing any previous one.
    async fn record(&self, user_id: Uuid, connection: ConnectionId);

    async fn remove(&self, user_id: Uuid);

    /// Removes the entry only if it still points at `connection`.
    /// Returns whether anything was removed.
    async fn release(&self, user_id: Uuid, connection: ConnectionId) -> bool;
}

/// Where a pushed event should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection of one user.
    User(Uuid),
    /// Every connection that joined the chat's room.
    Chat(Uuid),
    /// The chat's room minus one user's connections.
    ChatExcept { chat_id: Uuid, user_id: Uuid },
}

/// Fire-and-forget push to connected clients.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns how many connections the event was handed to. Zero is not an error.
    async fn publish(&self, audience: Audience, event: ChatEvent) -> PortResult<usize>;
}

//=========================================================================================
// External Service Ports
//=========================================================================================

#[async_trait]
pub trait MeetingRoomProvider: Send + Sync {
    /// Provisions a video room for the session and returns its join link.
    async fn create_room(&self, session: &Session) -> PortResult<String>;
}
