//! crates/mentorpulse_core/src/chat.rs
//!
//! The chat delivery engine: message creation, delivery flips and read receipts.
//!
//! Persisted state is the source of truth. Pushes are best-effort: a dropped
//! push is logged and the next `reconcile_pending_deliveries` sweep (or a
//! history fetch) brings the sender's view up to date.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    Chat, ChatEvent, ChatSummary, ChatView, Message, MessagePage, MessageType,
    MAX_MESSAGE_LENGTH,
};
use crate::error::{EngineError, EngineResult};
use crate::ports::{
    Audience, ChatRepository, EventPublisher, MessageRepository, PortError, PresenceRegistry,
    UserRepository,
};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Which messages a reader is acknowledging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeenSelection {
    AllUnread,
    Messages(Vec<Uuid>),
}

pub struct ChatEngine {
    users: Arc<dyn UserRepository>,
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    presence: Arc<dyn PresenceRegistry>,
    publisher: Arc<dyn EventPublisher>,
}

impl ChatEngine {
    pub fn new(
        users: Arc<dyn UserRepository>,
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        presence: Arc<dyn PresenceRegistry>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            users,
            chats,
            messages,
            presence,
            publisher,
        }
    }

    /// Returns the single active chat between the two users, creating it on first contact.
    pub async fn get_or_create_chat(&self, current: Uuid, other: Uuid) -> EngineResult<ChatView> {
        if current == other {
            return Err(EngineError::Validation(
                "You cannot start a chat with yourself".to_string(),
            ));
        }
        match self.users.get_user(other).await {
            Ok(_) => {}
            Err(PortError::NotFound(_)) => {
                return Err(EngineError::Validation("Participant not found".to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let pair = Chat::canonical_pair(current, other);
        let chat = match self.chats.find_active_chat(pair).await? {
            Some(chat) => chat,
            None => {
                let chat = Chat::new(current, other, Utc::now());
                match self.chats.insert_chat(&chat).await {
                    Ok(()) => {
                        info!(chat_id = %chat.id, "chat created");
                        chat
                    }
                    // Lost the race against a concurrent creator; theirs is the chat.
                    Err(PortError::Conflict(_)) => self
                        .chats
                        .find_active_chat(pair)
                        .await?
                        .ok_or_else(|| {
                            EngineError::Conflict("Chat creation raced; retry".to_string())
                        })?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let mut participants = Vec::with_capacity(2);
        for id in chat.participants {
            participants.push(self.users.get_user(id).await?.summary());
        }
        let last_message = self.last_message(&chat).await?;

        Ok(ChatView {
            chat,
            participants,
            last_message,
        })
    }

    /// The user's active conversations, newest activity first.
    pub async fn list_chats(&self, user_id: Uuid) -> EngineResult<Vec<ChatSummary>> {
        let chats = self.chats.list_active_chats_for_user(user_id).await?;
        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            let Some(other_id) = chat.other_participant(user_id) else {
                continue;
            };
            let other_participant = self.users.get_user(other_id).await?.summary();
            let last_message = self.last_message(&chat).await?;
            let unread_count = self.messages.count_unread(chat.id, user_id).await?;
            summaries.push(ChatSummary {
                chat,
                other_participant,
                last_message,
                unread_count,
            });
        }
        Ok(summaries)
    }

    /// Loads a chat and checks that `user_id` is one of its two participants.
    pub async fn ensure_participant(&self, chat_id: Uuid, user_id: Uuid) -> EngineResult<Chat> {
        let chat = self.chats.get_chat(chat_id).await?;
        if !chat.includes(user_id) {
            return Err(EngineError::Authorization(
                "You are not a participant in this chat".to_string(),
            ));
        }
        Ok(chat)
    }

    /// Persists a message, pushes it, and marks it delivered if the recipient is online.
    pub async fn send_message(
        &self,
        chat_id: Uuid,
        sender: Uuid,
        content: &str,
        message_type: MessageType,
    ) -> EngineResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(EngineError::Validation(format!(
                "Message content cannot exceed {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }

        let chat = self.chats.get_chat(chat_id).await?;
        if !chat.is_active {
            return Err(EngineError::Validation("Chat is no longer active".to_string()));
        }
        let Some(recipient) = chat.other_participant(sender) else {
            return Err(EngineError::Validation(
                "Sender is not a participant in this chat".to_string(),
            ));
        };

        let now = Utc::now();
        let mut message = Message::new(chat.id, sender, content.to_string(), message_type, now);
        self.messages.insert_message(&message).await?;
        self.chats.set_last_message(chat.id, message.id, now).await?;

        self.push(Audience::Chat(chat.id), ChatEvent::NewMessage(message.clone()))
            .await;
        self.push(Audience::User(sender), ChatEvent::MessageSent(message.clone()))
            .await;

        if self.presence.is_online(recipient).await {
            let delivered_at = Utc::now();
            match self.messages.mark_delivered(message.id, delivered_at).await {
                Ok(flipped) => {
                    message.mark_delivered(delivered_at);
                    if flipped {
                        self.push(
                            Audience::User(sender),
                            ChatEvent::MessageDelivered {
                                message_id: message.id,
                                chat_id: chat.id,
                                delivered_at,
                            },
                        )
                        .await;
                    }
                }
                Err(e) => {
                    // The next sweep for the recipient will deliver it.
                    error!(message_id = %message.id, error = %e, "failed to persist delivery");
                }
            }
        }

        Ok(message)
    }

    /// Records that `reader` has seen messages in the chat and notifies their senders.
    /// Returns only the messages this call changed.
    pub async fn mark_seen(
        &self,
        chat_id: Uuid,
        reader: Uuid,
        selection: SeenSelection,
    ) -> EngineResult<Vec<Message>> {
        let chat = self.ensure_participant(chat_id, reader).await?;
        self.mark_seen_in(&chat, reader, &selection).await
    }

    /// Delivers everything that queued up for `user_id` while they were away.
    /// Called when a client signals it is online and ready for events.
    pub async fn reconcile_pending_deliveries(&self, user_id: Uuid) -> EngineResult<Vec<Message>> {
        let chat_ids: Vec<Uuid> = self
            .chats
            .list_active_chats_for_user(user_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if chat_ids.is_empty() {
            return Ok(Vec::new());
        }

        let delivered = self.deliver_in(&chat_ids, user_id).await?;
        if !delivered.is_empty() {
            info!(%user_id, count = delivered.len(), "pending messages delivered");
        }
        Ok(delivered)
    }

    /// A page of history. Fetching history counts as receiving and reading it.
    pub async fn list_messages(
        &self,
        chat_id: Uuid,
        reader: Uuid,
        page: u32,
        limit: u32,
    ) -> EngineResult<MessagePage> {
        if page == 0 {
            return Err(EngineError::Validation("page starts at 1".to_string()));
        }
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let chat = self.ensure_participant(chat_id, reader).await?;

        self.deliver_in(&[chat.id], reader).await?;
        self.mark_seen_in(&chat, reader, &SeenSelection::AllUnread)
            .await?;

        let skip = u64::from(page - 1) * u64::from(limit);
        let messages = self
            .messages
            .list_messages(chat.id, skip, u64::from(limit))
            .await?;
        let total = self.messages.count_messages(chat.id).await?;

        Ok(MessagePage {
            messages,
            page,
            limit,
            total,
        })
    }

    /// Relays a typing indicator to the rest of the chat room.
    pub async fn relay_typing(&self, chat_id: Uuid, user_id: Uuid, is_typing: bool) -> EngineResult<()> {
        self.ensure_participant(chat_id, user_id).await?;
        let user = self.users.get_user(user_id).await?;
        self.push(
            Audience::ChatExcept { chat_id, user_id },
            ChatEvent::UserTyping {
                chat_id,
                user_id,
                name: user.name,
                is_typing,
            },
        )
        .await;
        Ok(())
    }

    async fn deliver_in(&self, chat_ids: &[Uuid], recipient: Uuid) -> EngineResult<Vec<Message>> {
        let delivered_at = Utc::now();
        let delivered = self
            .messages
            .deliver_pending(chat_ids, recipient, delivered_at)
            .await?;
        for message in &delivered {
            self.push(
                Audience::User(message.sender_id),
                ChatEvent::MessageDelivered {
                    message_id: message.id,
                    chat_id: message.chat_id,
                    delivered_at,
                },
            )
            .await;
        }
        Ok(delivered)
    }

    async fn mark_seen_in(
        &self,
        chat: &Chat,
        reader: Uuid,
        selection: &SeenSelection,
    ) -> EngineResult<Vec<Message>> {
        let ids = match selection {
            SeenSelection::AllUnread => None,
            SeenSelection::Messages(ids) if ids.is_empty() => return Ok(Vec::new()),
            SeenSelection::Messages(ids) => Some(ids.as_slice()),
        };
        let seen_at = Utc::now();
        let changed = self
            .messages
            .mark_seen(chat.id, reader, ids, seen_at)
            .await?;
        for message in &changed {
            self.push(
                Audience::User(message.sender_id),
                ChatEvent::MessageSeen {
                    message_id: message.id,
                    chat_id: chat.id,
                    seen_by: reader,
                    seen_at,
                },
            )
            .await;
        }
        Ok(changed)
    }

    async fn last_message(&self, chat: &Chat) -> EngineResult<Option<Message>> {
        match chat.last_message_id {
            Some(id) => match self.messages.get_message(id).await {
                Ok(message) => Ok(Some(message)),
                Err(PortError::NotFound(_)) => Ok(None),
                Err(e) => Err(e.into()),
            },
            None => Ok(None),
        }
    }

    async fn push(&self, audience: Audience, event: ChatEvent) {
        if let Err(e) = self.publisher.publish(audience, event).await {
            warn!(?audience, error = %e, "real-time push dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Role, User};
    use crate::memory::InMemoryStore;
    use crate::ports::ConnectionId;
    use crate::presence::InMemoryPresence;
    use crate::testing::{register, RecordingPublisher};

    struct Harness {
        engine: Arc<ChatEngine>,
        store: Arc<InMemoryStore>,
        presence: Arc<InMemoryPresence>,
        publisher: Arc<RecordingPublisher>,
        mentee: User,
        mentor: User,
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let presence = Arc::new(InMemoryPresence::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let engine = Arc::new(ChatEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            presence.clone(),
            publisher.clone(),
        ));
        let mentee = register(&store, "Mia", Role::Mentee).await;
        let mentor = register(&store, "Theo", Role::Mentor).await;
        Harness {
            engine,
            store,
            presence,
            publisher,
            mentee,
            mentor,
        }
    }

    #[tokio::test]
    async fn get_or_create_is_order_independent() {
        let h = harness().await;
        let first = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap();
        let second = h.engine.get_or_create_chat(h.mentor.id, h.mentee.id).await.unwrap();
        assert_eq!(first.chat.id, second.chat.id);
        assert_eq!(first.participants.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_chat() {
        let h = harness().await;
        let calls = (0..8).map(|i| {
            let engine = h.engine.clone();
            let (a, b) = if i % 2 == 0 {
                (h.mentee.id, h.mentor.id)
            } else {
                (h.mentor.id, h.mentee.id)
            };
            tokio::spawn(async move { engine.get_or_create_chat(a, b).await })
        });
        let ids: Vec<Uuid> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap().chat.id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(h.store.list_active_chats_for_user(h.mentee.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chat_with_self_or_unknown_user_is_rejected() {
        let h = harness().await;
        assert!(matches!(
            h.engine.get_or_create_chat(h.mentee.id, h.mentee.id).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            h.engine.get_or_create_chat(h.mentee.id, Uuid::new_v4()).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn offline_recipient_is_delivered_on_reconnect() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;

        let msg = h
            .engine
            .send_message(chat.id, h.mentee.id, "Hi", MessageType::Text)
            .await
            .unwrap();
        assert!(!msg.is_delivered);
        assert!(!h.store.get_message(msg.id).await.unwrap().is_delivered);
        assert!(h.publisher.delivered_to(h.mentee.id).is_empty());

        h.presence.record(h.mentor.id, ConnectionId::new()).await;
        let delivered = h.engine.reconcile_pending_deliveries(h.mentor.id).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(h.store.get_message(msg.id).await.unwrap().is_delivered);
        assert_eq!(h.publisher.delivered_to(h.mentee.id), vec![msg.id]);

        // A second sweep finds nothing new and announces nothing new.
        h.engine.reconcile_pending_deliveries(h.mentor.id).await.unwrap();
        assert_eq!(h.publisher.delivered_to(h.mentee.id), vec![msg.id]);
    }

    #[tokio::test]
    async fn online_recipient_is_delivered_immediately() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;
        h.presence.record(h.mentor.id, ConnectionId::new()).await;

        let msg = h
            .engine
            .send_message(chat.id, h.mentee.id, "  Hello there  ", MessageType::Text)
            .await
            .unwrap();
        assert!(msg.is_delivered);
        assert_eq!(msg.content, "Hello there");
        assert_eq!(h.publisher.delivered_to(h.mentee.id), vec![msg.id]);

        let events = h.publisher.events();
        assert!(matches!(
            &events[0],
            (Audience::Chat(c), ChatEvent::NewMessage(m)) if *c == chat.id && !m.is_delivered
        ));
        assert!(matches!(
            &events[1],
            (Audience::User(u), ChatEvent::MessageSent(m)) if *u == h.mentee.id && !m.is_delivered
        ));
    }

    #[tokio::test]
    async fn send_updates_last_message() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;
        let msg = h
            .engine
            .send_message(chat.id, h.mentor.id, "Welcome", MessageType::Text)
            .await
            .unwrap();
        let chats = h.engine.list_chats(h.mentee.id).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].last_message.as_ref().map(|m| m.id), Some(msg.id));
        assert_eq!(chats[0].other_participant.id, h.mentor.id);
        assert_eq!(chats[0].unread_count, 1);
    }

    #[tokio::test]
    async fn send_rejects_bad_input() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;
        let outsider = register(&h.store, "Eve", Role::Mentee).await;

        for (sender, content) in [
            (h.mentee.id, "   "),
            (outsider.id, "hello"),
        ] {
            assert!(matches!(
                h.engine.send_message(chat.id, sender, content, MessageType::Text).await,
                Err(EngineError::Validation(_))
            ));
        }
        let too_long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            h.engine.send_message(chat.id, h.mentee.id, &too_long, MessageType::Text).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn mark_seen_is_idempotent() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;
        let first = h.engine.send_message(chat.id, h.mentee.id, "one", MessageType::Text).await.unwrap();
        let second = h.engine.send_message(chat.id, h.mentee.id, "two", MessageType::Text).await.unwrap();
        // The reader's own messages are never affected.
        h.engine.send_message(chat.id, h.mentor.id, "three", MessageType::Text).await.unwrap();

        let changed = h
            .engine
            .mark_seen(chat.id, h.mentor.id, SeenSelection::AllUnread)
            .await
            .unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(h.publisher.seen_to(h.mentee.id), vec![first.id, second.id]);

        let again = h
            .engine
            .mark_seen(chat.id, h.mentor.id, SeenSelection::AllUnread)
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(h.publisher.seen_to(h.mentee.id).len(), 2);

        let stored = h.store.get_message(first.id).await.unwrap();
        assert!(stored.is_seen);
        assert_eq!(stored.read_by.len(), 2);
        assert!(h.publisher.seen_to(h.mentor.id).is_empty());
    }

    #[tokio::test]
    async fn mark_seen_single_message() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;
        let first = h.engine.send_message(chat.id, h.mentee.id, "one", MessageType::Text).await.unwrap();
        let second = h.engine.send_message(chat.id, h.mentee.id, "two", MessageType::Text).await.unwrap();

        let changed = h
            .engine
            .mark_seen(chat.id, h.mentor.id, SeenSelection::Messages(vec![second.id]))
            .await
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert!(!h.store.get_message(first.id).await.unwrap().is_seen);
        assert!(h.store.get_message(second.id).await.unwrap().is_seen);
    }

    #[tokio::test]
    async fn fetching_history_delivers_and_reads() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;
        for i in 0..3 {
            h.engine
                .send_message(chat.id, h.mentee.id, &format!("m{i}"), MessageType::Text)
                .await
                .unwrap();
        }

        let page = h.engine.list_messages(chat.id, h.mentor.id, 1, 2).await.unwrap();
        assert_eq!(page.total, 3);
        let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
        assert!(page.messages.iter().all(|m| m.is_delivered && m.is_seen));
        assert_eq!(h.publisher.delivered_to(h.mentee.id).len(), 3);
        assert_eq!(h.publisher.seen_to(h.mentee.id).len(), 3);

        assert!(matches!(
            h.engine.list_messages(chat.id, Uuid::new_v4(), 1, 10).await,
            Err(EngineError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn typing_is_relayed_to_everyone_else() {
        let h = harness().await;
        let chat = h.engine.get_or_create_chat(h.mentee.id, h.mentor.id).await.unwrap().chat;
        h.engine.relay_typing(chat.id, h.mentee.id, true).await.unwrap();

        let events = h.publisher.events();
        assert!(matches!(
            events.last(),
            Some((Audience::ChatExcept { chat_id, user_id }, ChatEvent::UserTyping { name, is_typing: true, .. }))
                if *chat_id == chat.id && *user_id == h.mentee.id && name == "Mia"
        ));
    }
}
