//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! The first frame must authenticate; after that the connection is registered
//! with the hub and client events are dispatched to the chat engine.

use crate::{
    error::ApiError,
    web::{
        dto::parse_client_message_type,
        hub::Outbox,
        protocol::{ClientMessage, ServerMessage},
        state::{AppState, ConnectionState},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream, StreamExt},
    Sink, SinkExt,
};
use mentorpulse_core::{PresenceRegistry, SeenSelection};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Authentication Phase ---
    let user_id = match authenticate(&app_state, &mut receiver).await {
        Ok(user_id) => user_id,
        Err(reason) => {
            warn!("WebSocket authentication failed: {}", reason);
            reject(&mut sender, &reason).await;
            return;
        }
    };

    let mut conn = ConnectionState::new(user_id);
    let outbox = app_state.hub.register(conn.connection_id, user_id).await;
    app_state.presence.record(user_id, conn.connection_id).await;
    info!(%user_id, connection = %conn.connection_id, "WebSocket connection authenticated");

    let writer = tokio::spawn(write_outbox(sender, outbox));
    app_state
        .hub
        .send_to(conn.connection_id, ServerMessage::Authenticated { user_id })
        .await;

    // --- 2. Main Message Loop ---
    loop {
        let next = tokio::select! {
            _ = app_state.shutdown.cancelled() => {
                info!(%user_id, "Server shutting down, closing WebSocket.");
                break;
            }
            next = receiver.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                handle_text_frame(text.as_str(), &app_state, &mut conn).await;
            }
            Some(Ok(Message::Close(_))) => {
                info!(%user_id, "Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(%user_id, "WebSocket receive error: {}", ApiError::from(e));
                break;
            }
            None => {
                info!(%user_id, "Client disconnected.");
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    app_state.hub.unregister(conn.connection_id).await;
    if !app_state.presence.release(user_id, conn.connection_id).await {
        debug!(%user_id, "presence entry already belonged to a newer connection");
    }
    if let Err(e) = writer.await {
        error!("WebSocket writer task failed: {:?}", e);
    }
    info!(%user_id, "WebSocket connection closed.");
}

/// Waits for the `authenticate` frame and resolves its token to a user id.
async fn authenticate(
    app_state: &AppState,
    receiver: &mut SplitStream<WebSocket>,
) -> Result<Uuid, String> {
    let frame = match timeout(AUTH_TIMEOUT, receiver.next()).await {
        Err(_) => return Err("timed out waiting for authentication".to_string()),
        Ok(None) | Ok(Some(Err(_))) => return Err("connection closed".to_string()),
        Ok(Some(Ok(frame))) => frame,
    };
    resolve_auth_frame(app_state, frame).await
}

/// The first frame must be an `authenticate` event carrying a live token.
async fn resolve_auth_frame(app_state: &AppState, frame: Message) -> Result<Uuid, String> {
    let Message::Text(text) = frame else {
        return Err("expected an authenticate event".to_string());
    };
    match serde_json::from_str::<ClientMessage>(text.as_str()) {
        Ok(ClientMessage::Authenticate { token }) => app_state
            .users
            .validate_auth_session(&token)
            .await
            .map_err(|_| "invalid or expired token".to_string()),
        Ok(_) => Err("expected an authenticate event".to_string()),
        Err(e) => Err(format!("malformed event: {}", e)),
    }
}

/// Tells the client why it was refused, then closes the socket.
async fn reject<S>(sender: &mut S, reason: &str)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let err_msg = ServerMessage::Error {
        message: format!("Authentication error: {}", reason),
    };
    match encode(&err_msg) {
        Ok(frame) => {
            if let Err(e) = sender.send(frame).await {
                debug!("Could not report authentication failure: {}", e);
            }
        }
        Err(e) => error!("{}", e),
    }
    let _ = sender.send(Message::Close(None)).await;
}

/// Drains the connection's outbox into the socket until the hub drops it.
async fn write_outbox(mut sender: SplitSink<WebSocket, Message>, mut outbox: Outbox) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = send_frame(&mut sender, &msg).await {
            debug!("Stopping WebSocket writer: {}", e);
            return;
        }
    }
    let _ = sender.send(Message::Close(None)).await;
}

fn encode(msg: &ServerMessage) -> Result<Message, ApiError> {
    let json = serde_json::to_string(msg)
        .map_err(|e| ApiError::Internal(format!("Failed to encode event: {}", e)))?;
    Ok(Message::Text(json.into()))
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), ApiError> {
    sender.send(encode(msg)?).await?;
    Ok(())
}

/// Parses and dispatches one text frame. A failure is reported back to this
/// connection as an `error` event; the connection stays open.
async fn handle_text_frame(text: &str, app_state: &Arc<AppState>, conn: &mut ConnectionState) {
    let outcome = match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => handle_client_message(client_msg, app_state, conn).await,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            Err(ApiError::BadRequest(format!("Malformed event: {}", e)))
        }
    };
    if let Err(e) = outcome {
        let err_msg = ServerMessage::Error {
            message: e.public_message(),
        };
        app_state.hub.send_to(conn.connection_id, err_msg).await;
    }
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_client_message(
    client_msg: ClientMessage,
    app_state: &Arc<AppState>,
    conn: &mut ConnectionState,
) -> Result<(), ApiError> {
    match client_msg {
        ClientMessage::Authenticate { .. } => {
            warn!("Received subsequent authenticate event, which is ignored.");
        }
        ClientMessage::JoinChat { chat_id } => {
            app_state.chat.ensure_participant(chat_id, conn.user_id).await?;
            if app_state.hub.join_chat(conn.connection_id, chat_id).await {
                conn.joined_chats.insert(chat_id);
                app_state
                    .hub
                    .send_to(conn.connection_id, ServerMessage::JoinedChat { chat_id })
                    .await;
            }
        }
        ClientMessage::LeaveChat { chat_id } => {
            app_state.hub.leave_chat(conn.connection_id, chat_id).await;
            conn.joined_chats.remove(&chat_id);
            app_state
                .hub
                .send_to(conn.connection_id, ServerMessage::LeftChat { chat_id })
                .await;
        }
        ClientMessage::TypingStart { chat_id } => {
            app_state.chat.relay_typing(chat_id, conn.user_id, true).await?;
        }
        ClientMessage::TypingStop { chat_id } => {
            app_state.chat.relay_typing(chat_id, conn.user_id, false).await?;
        }
        ClientMessage::SendMessage {
            chat_id,
            content,
            message_type,
        } => {
            let message_type = parse_client_message_type(message_type.as_deref())?;
            app_state
                .chat
                .send_message(chat_id, conn.user_id, &content, message_type)
                .await?;
        }
        ClientMessage::MessageReceived { message_id, chat_id } => {
            app_state
                .chat
                .mark_seen(chat_id, conn.user_id, SeenSelection::Messages(vec![message_id]))
                .await?;
        }
        ClientMessage::UserOnline => {
            app_state.presence.record(conn.user_id, conn.connection_id).await;
            app_state
                .chat
                .reconcile_pending_deliveries(conn.user_id)
                .await?;
        }
    }
    Ok(())
}
