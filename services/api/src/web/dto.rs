//! services/api/src/web/dto.rs
//!
//! JSON shapes shared by the REST handlers and the WebSocket protocol, and the
//! conversions from core domain records into them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mentorpulse_core::domain::{
    Approval, Chat, ChatSummary, ChatView, Message, MessagePage, Progress, ReadReceipt, Session,
    Skill, SkillClaim, User, UserSummary,
};
use mentorpulse_core::{ApprovalOutcome, MessageType};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;

//=========================================================================================
// Envelope
//=========================================================================================

/// The body of every successful response.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role.as_str().to_string(),
            bio: user.bio,
            avatar_url: user.avatar_url,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummaryDto {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub avatar_url: Option<String>,
}

impl From<UserSummary> for UserSummaryDto {
    fn from(user: UserSummary) -> Self {
        Self {
            id: user.id,
            name: user.name,
            role: user.role.as_str().to_string(),
            avatar_url: user.avatar_url,
        }
    }
}

//=========================================================================================
// Chats and messages
//=========================================================================================

#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptDto {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

impl From<ReadReceipt> for ReadReceiptDto {
    fn from(receipt: ReadReceipt) -> Self {
        Self {
            user_id: receipt.user_id,
            read_at: receipt.read_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_seen: bool,
    pub read_by: Vec<ReadReceiptDto>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type.as_str().to_string(),
            is_delivered: message.is_delivered,
            delivered_at: message.delivered_at,
            is_seen: message.is_seen,
            read_by: message.read_by.into_iter().map(Into::into).collect(),
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatDto {
    pub id: Uuid,
    pub participants: Vec<UserSummaryDto>,
    pub last_message: Option<MessageDto>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatView> for ChatDto {
    fn from(view: ChatView) -> Self {
        let ChatView {
            chat,
            participants,
            last_message,
        } = view;
        Self {
            id: chat.id,
            participants: participants.into_iter().map(Into::into).collect(),
            last_message: last_message.map(Into::into),
            is_active: chat.is_active,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummaryDto {
    pub id: Uuid,
    pub other_participant: UserSummaryDto,
    pub last_message: Option<MessageDto>,
    pub unread_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatSummary> for ChatSummaryDto {
    fn from(summary: ChatSummary) -> Self {
        let Chat { id, updated_at, .. } = summary.chat;
        Self {
            id,
            other_participant: summary.other_participant.into(),
            last_message: summary.last_message.map(Into::into),
            unread_count: summary.unread_count,
            updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagePageDto {
    pub messages: Vec<MessageDto>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

impl From<MessagePage> for MessagePageDto {
    fn from(page: MessagePage) -> Self {
        let has_more = u64::from(page.page) * u64::from(page.limit) < page.total;
        Self {
            messages: page.messages.into_iter().map(Into::into).collect(),
            page: page.page,
            limit: page.limit,
            total: page.total,
            has_more,
        }
    }
}

//=========================================================================================
// Sessions, skills and progress
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkillClaimDto {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub proficiency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<SkillClaim> for SkillClaimDto {
    fn from(claim: SkillClaim) -> Self {
        Self {
            name: claim.name,
            category: claim.category,
            proficiency: claim.proficiency,
            description: claim.description,
        }
    }
}

impl From<SkillClaimDto> for SkillClaim {
    fn from(dto: SkillClaimDto) -> Self {
        Self {
            name: dto.name,
            category: dto.category,
            proficiency: dto.proficiency,
            description: dto.description,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDto {
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl From<Approval> for ApprovalDto {
    fn from(approval: Approval) -> Self {
        Self {
            approved: approval.approved,
            approved_at: approval.approved_at,
            notes: approval.notes,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: Uuid,
    pub mentor_id: Uuid,
    pub mentee_id: Uuid,
    pub topic: String,
    pub description: Option<String>,
    pub session_type: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    pub end_time: String,
    pub price: f64,
    pub status: String,
    pub verification_status: String,
    pub mentor_approval: ApprovalDto,
    pub mentee_approval: ApprovalDto,
    pub completion_notes: Option<String>,
    pub actual_duration: Option<i32>,
    pub skills: Vec<SkillClaimDto>,
    pub meeting_link: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionDto {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            mentor_id: session.mentor_id,
            mentee_id: session.mentee_id,
            topic: session.topic,
            description: session.description,
            session_type: session.session_type.as_str().to_string(),
            date: session.date.format("%Y-%m-%d").to_string(),
            start_time: session.start_time.format("%H:%M").to_string(),
            end_time: session.end_time.format("%H:%M").to_string(),
            price: session.price_cents as f64 / 100.0,
            status: session.status.as_str().to_string(),
            verification_status: session.verification.as_str().to_string(),
            mentor_approval: session.mentor_approval.into(),
            mentee_approval: session.mentee_approval.into(),
            completion_notes: session.completion_notes,
            actual_duration: session.actual_duration_minutes,
            skills: session.skill_claims.into_iter().map(Into::into).collect(),
            meeting_link: session.meeting_link,
            cancellation_reason: session.cancellation_reason,
            cancelled_by: session.cancelled_by,
            completed_at: session.completed_at,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcomeDto {
    pub session: SessionDto,
    pub completed: bool,
    /// `mentor` or `mentee` while one approval is still missing.
    pub awaiting: Option<String>,
}

impl From<ApprovalOutcome> for ApprovalOutcomeDto {
    fn from(outcome: ApprovalOutcome) -> Self {
        let completed = outcome.completed();
        Self {
            awaiting: outcome.awaiting.map(|p| p.as_str().to_string()),
            session: outcome.session.into(),
            completed,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkillDto {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub proficiency: Option<String>,
    pub description: Option<String>,
    pub progress: u8,
    pub status: String,
    pub sessions: Vec<Uuid>,
    pub goals: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Skill> for SkillDto {
    fn from(skill: Skill) -> Self {
        Self {
            id: skill.id,
            name: skill.name,
            category: skill.category,
            proficiency: skill.proficiency,
            description: skill.description,
            progress: skill.progress,
            status: skill.status.as_str().to_string(),
            sessions: skill.session_ids,
            goals: skill.goal_ids,
            created_at: skill.created_at,
            updated_at: skill.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetricsDto {
    pub skills_improved: u32,
    pub skill_names: Vec<String>,
    pub session_duration: Option<i32>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: i32,
    pub session_id: Option<Uuid>,
    pub metrics: ProgressMetricsDto,
    pub created_at: DateTime<Utc>,
}

impl From<Progress> for ProgressDto {
    fn from(entry: Progress) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind.as_str().to_string(),
            value: entry.value,
            session_id: entry.session_id,
            metrics: ProgressMetricsDto {
                skills_improved: entry.metrics.skills_improved,
                skill_names: entry.metrics.skill_names,
                session_duration: entry.metrics.session_duration_minutes,
            },
            created_at: entry.created_at,
        }
    }
}

//=========================================================================================
// Input parsing helpers
//=========================================================================================

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("{} must be a YYYY-MM-DD date", field)))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ApiError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ApiError::BadRequest(format!("{} must be an HH:MM time", field)))
}

/// Converts a decimal price into whole cents.
pub fn price_to_cents(price: f64) -> Result<i64, ApiError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ApiError::BadRequest(
            "price must be a non-negative number".to_string(),
        ));
    }
    Ok((price * 100.0).round() as i64)
}

/// Clients may send text or file messages; system messages are server-only.
pub fn parse_client_message_type(raw: Option<&str>) -> Result<MessageType, ApiError> {
    let message_type = match raw {
        None => MessageType::Text,
        Some(raw) => raw
            .parse::<MessageType>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };
    if message_type == MessageType::System {
        return Err(ApiError::BadRequest(
            "System messages cannot be sent by clients".to_string(),
        ));
    }
    Ok(message_type)
}
