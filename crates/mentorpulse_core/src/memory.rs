//! crates/mentorpulse_core/src/memory.rs
//!
//! An in-memory implementation of every repository port. Each operation holds a
//! single lock for its whole read-modify-write, so the conditional primitives
//! (`mark_delivered`, `deliver_pending`, `mark_seen`, the uniqueness checks) are
//! atomic in the same way the Postgres adapter makes them atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    AuthSession, Chat, Message, Progress, Role, Session, Skill, User, UserCredentials,
};
use crate::ports::{
    ChatRepository, MessageRepository, PortError, PortResult, ProgressRepository,
    SessionRepository, SkillRepository, UserRepository,
};
use crate::skills::{apply_credit, CreditSource};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    password_hashes: HashMap<Uuid, String>,
    auth_sessions: HashMap<String, AuthSession>,
    chats: Vec<Chat>,
    // Insertion order is the authoritative message order.
    messages: Vec<Message>,
    sessions: Vec<Session>,
    skills: Vec<Skill>,
    progress: Vec<Progress>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

//=========================================================================================
// Users
//=========================================================================================

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn create_user_with_email(
        &self,
        name: &str,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User> {
        let mut state = self.state.lock().await;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email))
        {
            return Err(PortError::Conflict(format!("Email {} already registered", email)));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            bio: None,
            avatar_url: None,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        state
            .password_hashes
            .insert(user.id, hashed_password.to_string());
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let state = self.state.lock().await;
        let user = state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .ok_or_else(|| PortError::NotFound(format!("User with email {} not found", email)))?;
        let hashed_password = state
            .password_hashes
            .get(&user.id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("No credentials for {}", email)))?;
        Ok(UserCredentials {
            user_id: user.id,
            email: user.email.clone(),
            hashed_password,
        })
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut state = self.state.lock().await;
        state.auth_sessions.insert(
            token.to_string(),
            AuthSession {
                token: token.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid> {
        let state = self.state.lock().await;
        match state.auth_sessions.get(token) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        self.state.lock().await.auth_sessions.remove(token);
        Ok(())
    }
}

//=========================================================================================
// Chats
//=========================================================================================

#[async_trait]
impl ChatRepository for InMemoryStore {
    async fn find_active_chat(&self, participants: [Uuid; 2]) -> PortResult<Option<Chat>> {
        let state = self.state.lock().await;
        Ok(state
            .chats
            .iter()
            .find(|c| c.is_active && c.participants == participants)
            .cloned())
    }

    async fn insert_chat(&self, chat: &Chat) -> PortResult<()> {
        let mut state = self.state.lock().await;
        if chat.is_active
            && state
                .chats
                .iter()
                .any(|c| c.is_active && c.participants == chat.participants)
        {
            return Err(PortError::Conflict(
                "An active chat already exists for these participants".to_string(),
            ));
        }
        state.chats.push(chat.clone());
        Ok(())
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat> {
        let state = self.state.lock().await;
        state
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))
    }

    async fn list_active_chats_for_user(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let state = self.state.lock().await;
        let mut chats: Vec<Chat> = state
            .chats
            .iter()
            .filter(|c| c.is_active && c.includes(user_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn set_last_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let chat = state
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))?;
        chat.last_message_id = Some(message_id);
        chat.updated_at = at;
        Ok(())
    }
}

//=========================================================================================
// Messages
//=========================================================================================

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn insert_message(&self, message: &Message) -> PortResult<()> {
        self.state.lock().await.messages.push(message.clone());
        Ok(())
    }

    async fn get_message(&self, message_id: Uuid) -> PortResult<Message> {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Message {} not found", message_id)))
    }

    async fn list_messages(
        &self,
        chat_id: Uuid,
        skip: u64,
        limit: u64,
    ) -> PortResult<Vec<Message>> {
        let state = self.state.lock().await;
        let in_chat: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .collect();
        let end = in_chat.len().saturating_sub(skip as usize);
        let start = end.saturating_sub(limit as usize);
        Ok(in_chat[start..end].iter().map(|m| (*m).clone()).collect())
    }

    async fn count_messages(&self, chat_id: Uuid) -> PortResult<u64> {
        let state = self.state.lock().await;
        Ok(state.messages.iter().filter(|m| m.chat_id == chat_id).count() as u64)
    }

    async fn count_unread(&self, chat_id: Uuid, reader: Uuid) -> PortResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.sender_id != reader && !m.is_read_by(reader))
            .count() as u64)
    }

    async fn mark_delivered(&self, message_id: Uuid, at: DateTime<Utc>) -> PortResult<bool> {
        let mut state = self.state.lock().await;
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| PortError::NotFound(format!("Message {} not found", message_id)))?;
        Ok(message.mark_delivered(at))
    }

    async fn deliver_pending(
        &self,
        chat_ids: &[Uuid],
        recipient: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<Vec<Message>> {
        let mut state = self.state.lock().await;
        let mut flipped = Vec::new();
        for message in state
            .messages
            .iter_mut()
            .filter(|m| chat_ids.contains(&m.chat_id) && m.sender_id != recipient)
        {
            if message.mark_delivered(at) {
                flipped.push(message.clone());
            }
        }
        Ok(flipped)
    }

    async fn mark_seen(
        &self,
        chat_id: Uuid,
        reader: Uuid,
        message_ids: Option<&[Uuid]>,
        at: DateTime<Utc>,
    ) -> PortResult<Vec<Message>> {
        let mut state = self.state.lock().await;
        let mut changed = Vec::new();
        for message in state.messages.iter_mut().filter(|m| {
            m.chat_id == chat_id
                && m.sender_id != reader
                && message_ids.map_or(true, |ids| ids.contains(&m.id))
        }) {
            if message.mark_seen_by(reader, at) {
                changed.push(message.clone());
            }
        }
        Ok(changed)
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn insert_session(&self, session: &Session) -> PortResult<()> {
        self.state.lock().await.sessions.push(session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let state = self.state.lock().await;
        state
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn update_session(&self, session: &Session) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let slot = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session.id)))?;
        *slot = session.clone();
        Ok(())
    }

    async fn list_sessions_for_user(&self, user_id: Uuid) -> PortResult<Vec<Session>> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .iter()
            .filter(|s| s.involves(user_id))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.date, s.start_time));
        Ok(sessions)
    }
}

//=========================================================================================
// Skills and Progress
//=========================================================================================

#[async_trait]
impl SkillRepository for InMemoryStore {
    async fn credit_skill(&self, fresh: &Skill, source: CreditSource) -> PortResult<Skill> {
        let mut state = self.state.lock().await;
        let key = fresh.name.to_lowercase();
        let existing = state
            .skills
            .iter()
            .position(|s| s.user_id == fresh.user_id && s.name.to_lowercase() == key);
        match existing {
            Some(index) => {
                let skill = &mut state.skills[index];
                apply_credit(skill, source, fresh.updated_at);
                Ok(skill.clone())
            }
            None => {
                state.skills.push(fresh.clone());
                Ok(fresh.clone())
            }
        }
    }

    async fn list_skills_for_user(&self, user_id: Uuid) -> PortResult<Vec<Skill>> {
        let state = self.state.lock().await;
        Ok(state
            .skills
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryStore {
    async fn append_progress(&self, entry: &Progress) -> PortResult<()> {
        self.state.lock().await.progress.push(entry.clone());
        Ok(())
    }

    async fn list_progress_for_user(&self, user_id: Uuid) -> PortResult<Vec<Progress>> {
        let state = self.state.lock().await;
        Ok(state
            .progress
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}
