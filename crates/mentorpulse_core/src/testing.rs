//! Test doubles shared by the engine tests.

use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{ChatEvent, Role, Session, User};
use crate::memory::InMemoryStore;
use crate::ports::{
    Audience, EventPublisher, MeetingRoomProvider, PortError, PortResult, UserRepository,
};

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(Audience, ChatEvent)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(Audience, ChatEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Ids of messages whose delivery was announced to `user`.
    pub fn delivered_to(&self, user: Uuid) -> Vec<Uuid> {
        self.events()
            .into_iter()
            .filter_map(|(audience, event)| match (audience, event) {
                (Audience::User(u), ChatEvent::MessageDelivered { message_id, .. }) if u == user => {
                    Some(message_id)
                }
                _ => None,
            })
            .collect()
    }

    /// Ids of messages whose read receipt was announced to `user`.
    pub fn seen_to(&self, user: Uuid) -> Vec<Uuid> {
        self.events()
            .into_iter()
            .filter_map(|(audience, event)| match (audience, event) {
                (Audience::User(u), ChatEvent::MessageSeen { message_id, .. }) if u == user => {
                    Some(message_id)
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, audience: Audience, event: ChatEvent) -> PortResult<usize> {
        self.events.lock().unwrap().push((audience, event));
        Ok(1)
    }
}

pub struct StaticRooms;

#[async_trait]
impl MeetingRoomProvider for StaticRooms {
    async fn create_room(&self, session: &Session) -> PortResult<String> {
        Ok(format!("https://rooms.test/{}", session.id))
    }
}

pub struct BrokenRooms;

#[async_trait]
impl MeetingRoomProvider for BrokenRooms {
    async fn create_room(&self, _session: &Session) -> PortResult<String> {
        Err(PortError::Unexpected("room provider is down".into()))
    }
}

pub async fn register(store: &InMemoryStore, name: &str, role: Role) -> User {
    let email = format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4());
    store
        .create_user_with_email(name, &email, "hash", role)
        .await
        .unwrap()
}
