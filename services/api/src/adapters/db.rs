//! services/api/src/adapters/db.rs
//!
//! The Postgres adapter: the concrete implementation of every repository port
//! from the `core` crate, using `sqlx`.
//!
//! The conditional primitives (`mark_delivered`, `deliver_pending`, `mark_seen`)
//! are single statements, so concurrent callers never both see themselves as
//! the one that flipped a message.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mentorpulse_core::domain::{
    Approval, Chat, Message, Progress, ProgressMetrics, ReadReceipt, Role, Session, Skill,
    SkillClaim, SkillStatus, User, UserCredentials,
};
use mentorpulse_core::ports::{
    ChatRepository, MessageRepository, PortError, PortResult, ProgressRepository,
    SessionRepository, SkillRepository, UserRepository,
};
use mentorpulse_core::skills::{CreditSource, ACQUIRED_THRESHOLD, MAX_PROGRESS};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn store_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("Row not found".to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(db.message().to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn parse_column<T>(value: &str) -> PortResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e: T::Err| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, name, email, role, bio, avatar_url, created_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: parse_column(&self.role)?,
            bio: self.bio,
            avatar_url: self.avatar_url,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
}

const CHAT_COLUMNS: &str =
    "id, participant_a, participant_b, last_message_id, is_active, created_at, updated_at";

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    participant_a: Uuid,
    participant_b: Uuid,
    last_message_id: Option<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self) -> Chat {
        Chat {
            id: self.id,
            participants: [self.participant_a, self.participant_b],
            last_message_id: self.last_message_id,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const MESSAGE_COLUMNS: &str =
    "seq, id, chat_id, sender_id, content, message_type, is_delivered, delivered_at, is_seen, created_at";

#[derive(FromRow)]
struct MessageRecord {
    seq: i64,
    id: Uuid,
    chat_id: Uuid,
    sender_id: Uuid,
    content: String,
    message_type: String,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    is_seen: bool,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self, read_by: Vec<ReadReceipt>) -> PortResult<Message> {
        Ok(Message {
            id: self.id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            content: self.content,
            message_type: parse_column(&self.message_type)?,
            is_delivered: self.is_delivered,
            delivered_at: self.delivered_at,
            is_seen: self.is_seen,
            read_by,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ReadRecord {
    message_id: Uuid,
    user_id: Uuid,
    read_at: DateTime<Utc>,
}

const SESSION_COLUMNS: &str = "id, mentor_id, mentee_id, topic, description, session_type, date, \
     start_time, end_time, price_cents, status, verification_status, mentor_approved, \
     mentor_approved_at, mentor_approval_notes, mentee_approved, mentee_approved_at, \
     mentee_approval_notes, completion_notes, actual_duration_minutes, meeting_link, \
     cancellation_reason, cancelled_by, completed_at, created_at, updated_at";

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    mentor_id: Uuid,
    mentee_id: Uuid,
    topic: String,
    description: Option<String>,
    session_type: String,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    price_cents: i64,
    status: String,
    verification_status: String,
    mentor_approved: bool,
    mentor_approved_at: Option<DateTime<Utc>>,
    mentor_approval_notes: Option<String>,
    mentee_approved: bool,
    mentee_approved_at: Option<DateTime<Utc>>,
    mentee_approval_notes: Option<String>,
    completion_notes: Option<String>,
    actual_duration_minutes: Option<i32>,
    meeting_link: Option<String>,
    cancellation_reason: Option<String>,
    cancelled_by: Option<Uuid>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self, skill_claims: Vec<SkillClaim>) -> PortResult<Session> {
        Ok(Session {
            id: self.id,
            mentor_id: self.mentor_id,
            mentee_id: self.mentee_id,
            topic: self.topic,
            description: self.description,
            session_type: parse_column(&self.session_type)?,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            price_cents: self.price_cents,
            status: parse_column(&self.status)?,
            verification: parse_column(&self.verification_status)?,
            mentor_approval: Approval {
                approved: self.mentor_approved,
                approved_at: self.mentor_approved_at,
                notes: self.mentor_approval_notes,
            },
            mentee_approval: Approval {
                approved: self.mentee_approved,
                approved_at: self.mentee_approved_at,
                notes: self.mentee_approval_notes,
            },
            completion_notes: self.completion_notes,
            actual_duration_minutes: self.actual_duration_minutes,
            skill_claims,
            meeting_link: self.meeting_link,
            cancellation_reason: self.cancellation_reason,
            cancelled_by: self.cancelled_by,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ClaimRecord {
    session_id: Uuid,
    name: String,
    category: Option<String>,
    proficiency: Option<String>,
    description: Option<String>,
}
impl ClaimRecord {
    fn to_domain(self) -> SkillClaim {
        SkillClaim {
            name: self.name,
            category: self.category,
            proficiency: self.proficiency,
            description: self.description,
        }
    }
}

const SKILL_COLUMNS: &str = "id, user_id, name, category, proficiency, description, progress, \
     status, session_ids, goal_ids, created_at, updated_at";

#[derive(FromRow)]
struct SkillRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    category: Option<String>,
    proficiency: Option<String>,
    description: Option<String>,
    progress: i16,
    status: String,
    session_ids: Vec<Uuid>,
    goal_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SkillRecord {
    fn to_domain(self) -> PortResult<Skill> {
        Ok(Skill {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            category: self.category,
            proficiency: self.proficiency,
            description: self.description,
            progress: self.progress.clamp(0, 100) as u8,
            status: parse_column(&self.status)?,
            session_ids: self.session_ids,
            goal_ids: self.goal_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProgressRecord {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    value: i32,
    session_id: Option<Uuid>,
    skills_improved: i32,
    skill_names: Vec<String>,
    session_duration_minutes: Option<i32>,
    created_at: DateTime<Utc>,
}
impl ProgressRecord {
    fn to_domain(self) -> PortResult<Progress> {
        Ok(Progress {
            id: self.id,
            user_id: self.user_id,
            kind: parse_column(&self.kind)?,
            value: self.value,
            session_id: self.session_id,
            metrics: ProgressMetrics {
                skills_improved: self.skills_improved.max(0) as u32,
                skill_names: self.skill_names,
                session_duration_minutes: self.session_duration_minutes,
            },
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// Helpers that stitch child rows onto their parents
//=========================================================================================

impl DbAdapter {
    async fn with_reads(&self, mut records: Vec<MessageRecord>) -> PortResult<Vec<Message>> {
        records.sort_by_key(|r| r.seq);
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let reads = sqlx::query_as::<_, ReadRecord>(
            "SELECT message_id, user_id, read_at FROM message_reads \
             WHERE message_id = ANY($1) ORDER BY read_at ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut by_message: HashMap<Uuid, Vec<ReadReceipt>> = HashMap::new();
        for read in reads {
            by_message.entry(read.message_id).or_default().push(ReadReceipt {
                user_id: read.user_id,
                read_at: read.read_at,
            });
        }
        records
            .into_iter()
            .map(|r| {
                let read_by = by_message.remove(&r.id).unwrap_or_default();
                r.to_domain(read_by)
            })
            .collect()
    }

    async fn with_claims(&self, records: Vec<SessionRecord>) -> PortResult<Vec<Session>> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let claims = sqlx::query_as::<_, ClaimRecord>(
            "SELECT session_id, name, category, proficiency, description \
             FROM session_skill_claims WHERE session_id = ANY($1) ORDER BY session_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut by_session: HashMap<Uuid, Vec<SkillClaim>> = HashMap::new();
        for claim in claims {
            by_session
                .entry(claim.session_id)
                .or_default()
                .push(claim.to_domain());
        }
        records
            .into_iter()
            .map(|r| {
                let claims = by_session.remove(&r.id).unwrap_or_default();
                r.to_domain(claims)
            })
            .collect()
    }

    async fn write_claims(
        tx: &mut Transaction<'_, Postgres>,
        session: &Session,
    ) -> PortResult<()> {
        sqlx::query("DELETE FROM session_skill_claims WHERE session_id = $1")
            .bind(session.id)
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        for (position, claim) in session.skill_claims.iter().enumerate() {
            sqlx::query(
                "INSERT INTO session_skill_claims \
                 (session_id, position, name, category, proficiency, description) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(session.id)
            .bind(position as i32)
            .bind(&claim.name)
            .bind(&claim.category)
            .bind(&claim.proficiency)
            .bind(&claim.description)
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        }
        Ok(())
    }
}

//=========================================================================================
// Users
//=========================================================================================

#[async_trait]
impl UserRepository for DbAdapter {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?
            .to_domain()
    }

    async fn create_user_with_email(
        &self,
        name: &str,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, hashed_password, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, now()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(email)
            .bind(hashed_password)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match store_error(e) {
                PortError::Conflict(_) => {
                    PortError::Conflict(format!("Email {} already registered", email))
                }
                other => other,
            })?
            .to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| PortError::NotFound(format!("User with email {} not found", email)))?;
        Ok(UserCredentials {
            user_id: record.id,
            email: record.email,
            hashed_password: record.hashed_password,
        })
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE token = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

//=========================================================================================
// Chats
//=========================================================================================

#[async_trait]
impl ChatRepository for DbAdapter {
    async fn find_active_chat(&self, participants: [Uuid; 2]) -> PortResult<Option<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats \
             WHERE participant_a = $1 AND participant_b = $2 AND is_active"
        );
        let record = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(participants[0])
            .bind(participants[1])
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(record.map(ChatRecord::to_domain))
    }

    async fn insert_chat(&self, chat: &Chat) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO chats \
             (id, participant_a, participant_b, last_message_id, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(chat.id)
        .bind(chat.participants[0])
        .bind(chat.participants[1])
        .bind(chat.last_message_id)
        .bind(chat.is_active)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1");
        sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(ChatRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))
    }

    async fn list_active_chats_for_user(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats \
             WHERE is_active AND (participant_a = $1 OR participant_b = $1) \
             ORDER BY updated_at DESC"
        );
        let records = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(records.into_iter().map(ChatRecord::to_domain).collect())
    }

    async fn set_last_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE chats SET last_message_id = $2, updated_at = $3 WHERE id = $1")
                .bind(chat_id)
                .bind(message_id)
                .bind(at)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chat {} not found", chat_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// Messages
//=========================================================================================

#[async_trait]
impl MessageRepository for DbAdapter {
    async fn insert_message(&self, message: &Message) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query(
            "INSERT INTO messages \
             (id, chat_id, sender_id, content, message_type, is_delivered, delivered_at, is_seen, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(message.id)
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.is_delivered)
        .bind(message.delivered_at)
        .bind(message.is_seen)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        for receipt in &message.read_by {
            sqlx::query(
                "INSERT INTO message_reads (message_id, user_id, read_at) VALUES ($1, $2, $3) \
                 ON CONFLICT (message_id, user_id) DO NOTHING",
            )
            .bind(message.id)
            .bind(receipt.user_id)
            .bind(receipt.read_at)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn get_message(&self, message_id: Uuid) -> PortResult<Message> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| PortError::NotFound(format!("Message {} not found", message_id)))?;
        self.with_reads(vec![record])
            .await?
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Message {} not found", message_id)))
    }

    async fn list_messages(
        &self,
        chat_id: Uuid,
        skip: u64,
        limit: u64,
    ) -> PortResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = $1 \
             ORDER BY seq DESC OFFSET $2 LIMIT $3"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(chat_id)
            .bind(skip as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        self.with_reads(records).await
    }

    async fn count_messages(&self, chat_id: Uuid) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(count.max(0) as u64)
    }

    async fn count_unread(&self, chat_id: Uuid, reader: Uuid) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages m \
             WHERE m.chat_id = $1 AND m.sender_id <> $2 AND NOT EXISTS ( \
                 SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = $2)",
        )
        .bind(chat_id)
        .bind(reader)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(count.max(0) as u64)
    }

    async fn mark_delivered(&self, message_id: Uuid, at: DateTime<Utc>) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET is_delivered = TRUE, delivered_at = $2 \
             WHERE id = $1 AND NOT is_delivered",
        )
        .bind(message_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM messages WHERE id = $1)")
            .bind(message_id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        if exists {
            Ok(false)
        } else {
            Err(PortError::NotFound(format!("Message {} not found", message_id)))
        }
    }

    async fn deliver_pending(
        &self,
        chat_ids: &[Uuid],
        recipient: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<Vec<Message>> {
        let sql = format!(
            "UPDATE messages SET is_delivered = TRUE, delivered_at = $3 \
             WHERE chat_id = ANY($1) AND sender_id <> $2 AND NOT is_delivered \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(chat_ids)
            .bind(recipient)
            .bind(at)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        self.with_reads(records).await
    }

    async fn mark_seen(
        &self,
        chat_id: Uuid,
        reader: Uuid,
        message_ids: Option<&[Uuid]>,
        at: DateTime<Utc>,
    ) -> PortResult<Vec<Message>> {
        // Only receipts this statement actually inserted flip `is_seen` and come back.
        let sql = format!(
            "WITH targets AS ( \
                 SELECT id FROM messages \
                 WHERE chat_id = $1 AND sender_id <> $2 AND ($3::uuid[] IS NULL OR id = ANY($3)) \
             ), inserted AS ( \
                 INSERT INTO message_reads (message_id, user_id, read_at) \
                 SELECT id, $2, $4 FROM targets \
                 ON CONFLICT (message_id, user_id) DO NOTHING \
                 RETURNING message_id \
             ) \
             UPDATE messages SET is_seen = TRUE \
             WHERE id IN (SELECT message_id FROM inserted) \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(chat_id)
            .bind(reader)
            .bind(message_ids.map(|ids| ids.to_vec()))
            .bind(at)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        self.with_reads(records).await
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

#[async_trait]
impl SessionRepository for DbAdapter {
    async fn insert_session(&self, session: &Session) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query(
            "INSERT INTO mentoring_sessions \
             (id, mentor_id, mentee_id, topic, description, session_type, date, start_time, \
              end_time, price_cents, status, verification_status, mentor_approved, \
              mentor_approved_at, mentor_approval_notes, mentee_approved, mentee_approved_at, \
              mentee_approval_notes, completion_notes, actual_duration_minutes, meeting_link, \
              cancellation_reason, cancelled_by, completed_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)",
        )
        .bind(session.id)
        .bind(session.mentor_id)
        .bind(session.mentee_id)
        .bind(&session.topic)
        .bind(&session.description)
        .bind(session.session_type.as_str())
        .bind(session.date)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.price_cents)
        .bind(session.status.as_str())
        .bind(session.verification.as_str())
        .bind(session.mentor_approval.approved)
        .bind(session.mentor_approval.approved_at)
        .bind(&session.mentor_approval.notes)
        .bind(session.mentee_approval.approved)
        .bind(session.mentee_approval.approved_at)
        .bind(&session.mentee_approval.notes)
        .bind(&session.completion_notes)
        .bind(session.actual_duration_minutes)
        .bind(&session.meeting_link)
        .bind(&session.cancellation_reason)
        .bind(session.cancelled_by)
        .bind(session.completed_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        Self::write_claims(&mut tx, session).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM mentoring_sessions WHERE id = $1");
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))?;
        self.with_claims(vec![record])
            .await?
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn update_session(&self, session: &Session) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let result = sqlx::query(
            "UPDATE mentoring_sessions SET \
                 topic = $2, description = $3, session_type = $4, date = $5, start_time = $6, \
                 end_time = $7, price_cents = $8, status = $9, verification_status = $10, \
                 mentor_approved = $11, mentor_approved_at = $12, mentor_approval_notes = $13, \
                 mentee_approved = $14, mentee_approved_at = $15, mentee_approval_notes = $16, \
                 completion_notes = $17, actual_duration_minutes = $18, meeting_link = $19, \
                 cancellation_reason = $20, cancelled_by = $21, completed_at = $22, updated_at = $23 \
             WHERE id = $1",
        )
        .bind(session.id)
        .bind(&session.topic)
        .bind(&session.description)
        .bind(session.session_type.as_str())
        .bind(session.date)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.price_cents)
        .bind(session.status.as_str())
        .bind(session.verification.as_str())
        .bind(session.mentor_approval.approved)
        .bind(session.mentor_approval.approved_at)
        .bind(&session.mentor_approval.notes)
        .bind(session.mentee_approval.approved)
        .bind(session.mentee_approval.approved_at)
        .bind(&session.mentee_approval.notes)
        .bind(&session.completion_notes)
        .bind(session.actual_duration_minutes)
        .bind(&session.meeting_link)
        .bind(&session.cancellation_reason)
        .bind(session.cancelled_by)
        .bind(session.completed_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Session {} not found", session.id)));
        }
        Self::write_claims(&mut tx, session).await?;
        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn list_sessions_for_user(&self, user_id: Uuid) -> PortResult<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM mentoring_sessions \
             WHERE mentor_id = $1 OR mentee_id = $1 ORDER BY date ASC, start_time ASC"
        );
        let records = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        self.with_claims(records).await
    }
}

//=========================================================================================
// Skills and progress
//=========================================================================================

#[async_trait]
impl SkillRepository for DbAdapter {
    async fn credit_skill(&self, fresh: &Skill, source: CreditSource) -> PortResult<Skill> {
        let (session_link, goal_link) = match source {
            CreditSource::Session(id) => (Some(id), None),
            CreditSource::Goal(id) => (None, Some(id)),
        };
        // The unique index on (user_id, lower(name)) turns a repeat mention into an
        // in-place increment, evaluated under the row lock.
        let sql = format!(
            "INSERT INTO skills \
             (id, user_id, name, category, proficiency, description, progress, status, \
              session_ids, goal_ids, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (user_id, (lower(name))) DO UPDATE SET \
               progress = LEAST(skills.progress + $13, {max}), \
               status = CASE \
                 WHEN skills.progress + $13 >= {max} THEN '{mastered}' \
                 WHEN skills.progress + $13 >= {acquired} THEN '{acquired_status}' \
                 ELSE '{learning}' END, \
               session_ids = CASE \
                 WHEN $14::uuid IS NULL OR $14::uuid = ANY(skills.session_ids) THEN skills.session_ids \
                 ELSE array_append(skills.session_ids, $14::uuid) END, \
               goal_ids = CASE \
                 WHEN $15::uuid IS NULL OR $15::uuid = ANY(skills.goal_ids) THEN skills.goal_ids \
                 ELSE array_append(skills.goal_ids, $15::uuid) END, \
               updated_at = EXCLUDED.updated_at \
             RETURNING {SKILL_COLUMNS}",
            max = MAX_PROGRESS,
            acquired = ACQUIRED_THRESHOLD,
            mastered = SkillStatus::Mastered.as_str(),
            acquired_status = SkillStatus::Acquired.as_str(),
            learning = SkillStatus::Learning.as_str(),
        );
        sqlx::query_as::<_, SkillRecord>(&sql)
            .bind(fresh.id)
            .bind(fresh.user_id)
            .bind(&fresh.name)
            .bind(&fresh.category)
            .bind(&fresh.proficiency)
            .bind(&fresh.description)
            .bind(i16::from(fresh.progress))
            .bind(fresh.status.as_str())
            .bind(&fresh.session_ids)
            .bind(&fresh.goal_ids)
            .bind(fresh.created_at)
            .bind(fresh.updated_at)
            .bind(i16::from(source.step()))
            .bind(session_link)
            .bind(goal_link)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?
            .to_domain()
    }

    async fn list_skills_for_user(&self, user_id: Uuid) -> PortResult<Vec<Skill>> {
        let sql = format!("SELECT {SKILL_COLUMNS} FROM skills WHERE user_id = $1 ORDER BY name");
        sqlx::query_as::<_, SkillRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(SkillRecord::to_domain)
            .collect()
    }
}

#[async_trait]
impl ProgressRepository for DbAdapter {
    async fn append_progress(&self, entry: &Progress) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO progress_entries \
             (id, user_id, kind, value, session_id, skills_improved, skill_names, \
              session_duration_minutes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.value)
        .bind(entry.session_id)
        .bind(entry.metrics.skills_improved as i32)
        .bind(&entry.metrics.skill_names)
        .bind(entry.metrics.session_duration_minutes)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn list_progress_for_user(&self, user_id: Uuid) -> PortResult<Vec<Progress>> {
        sqlx::query_as::<_, ProgressRecord>(
            "SELECT id, user_id, kind, value, session_id, skills_improved, skill_names, \
             session_duration_minutes, created_at FROM progress_entries \
             WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?
        .into_iter()
        .map(ProgressRecord::to_domain)
        .collect()
    }
}
