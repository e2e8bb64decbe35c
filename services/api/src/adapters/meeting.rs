//! services/api/src/adapters/meeting.rs
//!
//! A meeting-room adapter that derives a stable room link from the session id.
//! Rooms on the configured service are created on first join, so nothing is
//! provisioned up front.

use async_trait::async_trait;
use mentorpulse_core::domain::Session;
use mentorpulse_core::ports::{MeetingRoomProvider, PortError, PortResult};

pub struct LinkRoomProvider {
    base_url: String,
}

impl LinkRoomProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MeetingRoomProvider for LinkRoomProvider {
    async fn create_room(&self, session: &Session) -> PortResult<String> {
        if self.base_url.is_empty() {
            return Err(PortError::Unexpected(
                "No meeting base URL is configured".to_string(),
            ));
        }
        Ok(format!("{}/mentorpulse-{}", self.base_url, session.id))
    }
}
