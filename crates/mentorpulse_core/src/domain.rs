//! crates/mentorpulse_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::lifecycle::{SessionStatus, VerificationStatus};

/// Upper bound on the length of a chat message, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Error returned when a stored or submitted enum tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Mentee,
    Mentor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mentee => "mentee",
            Role::Mentor => "mentor",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mentee" => Ok(Role::Mentee),
            "mentor" => Ok(Role::Mentor),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// The slice of a user that is safe to show the other side of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub avatar_url: Option<String>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a bearer-token login session
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Chats and Messages
//=========================================================================================

/// A one-to-one conversation. `participants` is always stored in canonical (sorted) order.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub last_message_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Orders an unordered pair so that `(a, b)` and `(b, a)` map to the same key.
    pub fn canonical_pair(a: Uuid, b: Uuid) -> [Uuid; 2] {
        if a <= b {
            [a, b]
        } else {
            [b, a]
        }
    }

    pub fn new(a: Uuid, b: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            participants: Self::canonical_pair(a, b),
            last_message_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn includes(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The participant that is not `user_id`, or `None` if `user_id` is not in this chat.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    File,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::File => "file",
            MessageType::System => "system",
        }
    }
}

impl FromStr for MessageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "file" => Ok(MessageType::File),
            "system" => Ok(MessageType::System),
            other => Err(UnknownVariant::new("message type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// A single chat message and its delivery/read state.
///
/// `is_delivered` and `is_seen` only ever move from `false` to `true`, and
/// `read_by` is append-only with at most one receipt per user.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_seen: bool,
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A freshly sent message: undelivered, unseen, and read only by its sender.
    pub fn new(
        chat_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: MessageType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            sender_id,
            content,
            message_type,
            is_delivered: false,
            delivered_at: None,
            is_seen: false,
            read_by: vec![ReadReceipt {
                user_id: sender_id,
                read_at: now,
            }],
            created_at: now,
        }
    }

    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    /// Flips the delivered flag. Returns `false` if it was already set.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_delivered {
            return false;
        }
        self.is_delivered = true;
        self.delivered_at = Some(at);
        true
    }

    /// Appends a read receipt for `reader` and sets `is_seen`.
    /// Returns `false` (and changes nothing) if the reader already has a receipt.
    pub fn mark_seen_by(&mut self, reader: Uuid, at: DateTime<Utc>) -> bool {
        if self.is_read_by(reader) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user_id: reader,
            read_at: at,
        });
        self.is_seen = true;
        true
    }
}

/// A chat as shown right after `get-or-create`.
#[derive(Debug, Clone)]
pub struct ChatView {
    pub chat: Chat,
    pub participants: Vec<UserSummary>,
    pub last_message: Option<Message>,
}

/// A row in the user's conversation list.
#[derive(Debug, Clone)]
pub struct ChatSummary {
    pub chat: Chat,
    pub other_participant: UserSummary,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

/// One page of a chat's history, in chronological order.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Events pushed to connected clients over the real-time channel.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    NewMessage(Message),
    MessageSent(Message),
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
}

//=========================================================================================
// Mentoring Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Video,
    Audio,
    Chat,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Video => "video",
            SessionType::Audio => "audio",
            SessionType::Chat => "chat",
        }
    }
}

impl FromStr for SessionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(SessionType::Video),
            "audio" => Ok(SessionType::Audio),
            "chat" => Ok(SessionType::Chat),
            other => Err(UnknownVariant::new("session type", other)),
        }
    }
}

/// One party's answer to a completion request.
///
/// `approved_at` is stamped whenever the party responds, so an explicit
/// rejection (`approved == false`, `approved_at` set) is distinguishable
/// from no response at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Approval {
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Approval {
    pub fn is_rejection(&self) -> bool {
        self.approved_at.is_some() && !self.approved
    }
}

/// A skill the mentor says the session worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillClaim {
    pub name: String,
    pub category: Option<String>,
    pub proficiency: Option<String>,
    pub description: Option<String>,
}

impl SkillClaim {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            proficiency: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub mentor_id: Uuid,
    pub mentee_id: Uuid,
    pub topic: String,
    pub description: Option<String>,
    pub session_type: SessionType,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_cents: i64,
    pub status: SessionStatus,
    pub verification: VerificationStatus,
    pub mentor_approval: Approval,
    pub mentee_approval: Approval,
    pub completion_notes: Option<String>,
    pub actual_duration_minutes: Option<i32>,
    /// Claims recorded at initiation, kept for crediting at completion time.
    pub skill_claims: Vec<SkillClaim>,
    pub meeting_link: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.mentor_id == user_id || self.mentee_id == user_id
    }
}

/// Everything needed to put a session on the calendar.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub mentor_id: Uuid,
    pub mentee_id: Uuid,
    pub topic: String,
    pub description: Option<String>,
    pub session_type: SessionType,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_cents: i64,
}

//=========================================================================================
// Skills and Progress
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillStatus {
    Learning,
    Acquired,
    Mastered,
}

impl SkillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillStatus::Learning => "learning",
            SkillStatus::Acquired => "acquired",
            SkillStatus::Mastered => "mastered",
        }
    }
}

impl FromStr for SkillStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learning" => Ok(SkillStatus::Learning),
            "acquired" => Ok(SkillStatus::Acquired),
            "mastered" => Ok(SkillStatus::Mastered),
            other => Err(UnknownVariant::new("skill status", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub proficiency: Option<String>,
    pub description: Option<String>,
    /// 0..=100
    pub progress: u8,
    pub status: SkillStatus,
    pub session_ids: Vec<Uuid>,
    pub goal_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    SessionCompleted,
    SkillAcquired,
    GoalAchieved,
    MilestoneReached,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::SessionCompleted => "session_completed",
            ProgressKind::SkillAcquired => "skill_acquired",
            ProgressKind::GoalAchieved => "goal_achieved",
            ProgressKind::MilestoneReached => "milestone_reached",
        }
    }
}

impl FromStr for ProgressKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_completed" => Ok(ProgressKind::SessionCompleted),
            "skill_acquired" => Ok(ProgressKind::SkillAcquired),
            "goal_achieved" => Ok(ProgressKind::GoalAchieved),
            "milestone_reached" => Ok(ProgressKind::MilestoneReached),
            other => Err(UnknownVariant::new("progress kind", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressMetrics {
    pub skills_improved: u32,
    pub skill_names: Vec<String>,
    pub session_duration_minutes: Option<i32>,
}

/// An immutable ledger entry. Never updated after it is appended.
#[derive(Debug, Clone)]
pub struct Progress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: ProgressKind,
    pub value: i32,
    pub session_id: Option<Uuid>,
    pub metrics: ProgressMetrics,
    pub created_at: DateTime<Utc>,
}
