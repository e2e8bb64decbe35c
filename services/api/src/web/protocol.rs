//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server.
//! Every frame is a JSON text frame tagged by its `event` field.

use chrono::{DateTime, Utc};
use mentorpulse_core::ChatEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::web::dto::MessageDto;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Must be the first frame on the connection.
    Authenticate { token: String },

    JoinChat { chat_id: Uuid },

    LeaveChat { chat_id: Uuid },

    TypingStart { chat_id: Uuid },

    TypingStop { chat_id: Uuid },

    SendMessage {
        chat_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: Option<String>,
    },

    /// The client displayed this message to its user.
    MessageReceived { message_id: Uuid, chat_id: Uuid },

    /// The client is ready for events; triggers the pending-delivery sweep.
    UserOnline,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Confirms the token was accepted.
    Authenticated { user_id: Uuid },

    JoinedChat { chat_id: Uuid },

    LeftChat { chat_id: Uuid },

    NewMessage { message: MessageDto },

    /// Sent to the author once their message is stored.
    MessageSent { message: MessageDto },

    MessageDelivered {
        message_id: Uuid,
        chat_id: Uuid,
        delivered_at: DateTime<Utc>,
    },

    MessageSeen {
        message_id: Uuid,
        chat_id: Uuid,
        seen_by: Uuid,
        seen_at: DateTime<Utc>,
    },

    UserTyping {
        chat_id: Uuid,
        user_id: Uuid,
        name: String,
        is_typing: bool,
    },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

impl From<ChatEvent> for ServerMessage {
    fn from(event: ChatEvent) -> Self {
        match event {
            ChatEvent::NewMessage(message) => ServerMessage::NewMessage {
                message: message.into(),
            },
            ChatEvent::MessageSent(message) => ServerMessage::MessageSent {
                message: message.into(),
            },
            ChatEvent::MessageDelivered {
                message_id,
                chat_id,
                delivered_at,
            } => ServerMessage::MessageDelivered {
                message_id,
                chat_id,
                delivered_at,
            },
            ChatEvent::MessageSeen {
                message_id,
                chat_id,
                seen_by,
                seen_at,
            } => ServerMessage::MessageSeen {
                message_id,
                chat_id,
                seen_by,
                seen_at,
            },
            ChatEvent::UserTyping {
                chat_id,
                user_id,
                name,
                is_typing,
            } => ServerMessage::UserTyping {
                chat_id,
                user_id,
                name,
                is_typing,
            },
        }
    }
}
