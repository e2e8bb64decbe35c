//! crates/mentorpulse_core/src/sessions.rs
//!
//! The session lifecycle engine: booking, the two-sided completion handshake,
//! direct completion, cancellation, and the skill crediting side effect.
//!
//! Every mutation of a session runs under that session's lock, so the
//! "both approved" check and the transition to `Completed` cannot interleave
//! with another approval, completion or cancellation of the same session.

use chrono::Utc;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    Approval, BookingRequest, Progress, ProgressKind, ProgressMetrics, Role, Session,
    SessionType, Skill, SkillClaim, UnknownVariant,
};
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{derive_verification, validate_transition, Party, SessionStatus, VerificationStatus};
use crate::ports::{
    MeetingRoomProvider, PortError, ProgressRepository, SessionRepository, UserRepository,
};
use crate::skills::{CreditSource, SkillCreditor};

/// When a session's skill claims turn into skill progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreditPolicy {
    /// As soon as the mentor initiates completion, before anyone approves.
    #[default]
    AtInitiation,
    /// Only once the session actually reaches `Completed`.
    AtCompletion,
}

impl FromStr for CreditPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initiation" => Ok(CreditPolicy::AtInitiation),
            "completion" => Ok(CreditPolicy::AtCompletion),
            other => Err(UnknownVariant::new("credit policy", other)),
        }
    }
}

/// What the mentor reports when wrapping up a session.
#[derive(Debug, Clone, Default)]
pub struct CompletionReport {
    pub notes: Option<String>,
    pub skills: Vec<SkillClaim>,
    pub actual_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ApprovalInput {
    pub approved: bool,
    pub notes: Option<String>,
    pub actual_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub session: Session,
    /// The party whose approval is still missing, if the session did not complete.
    pub awaiting: Option<Party>,
}

impl ApprovalOutcome {
    pub fn completed(&self) -> bool {
        self.session.status == SessionStatus::Completed
    }
}

//=========================================================================================
// Per-session locks
//=========================================================================================

/// A lock table keyed by session id. Entries live only while someone holds
/// or waits on them.
#[derive(Default)]
struct SessionLocks {
    table: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: Uuid) -> SessionGuard<'_> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(session_id).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        SessionGuard {
            locks: self,
            session_id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut table = self.locks.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = table.get(&self.session_id) {
            // Only the table's own reference left: nobody holds or waits on it.
            if Arc::strong_count(lock) == 1 {
                table.remove(&self.session_id);
            }
        }
    }
}

//=========================================================================================
// The engine
//=========================================================================================

pub struct SessionEngine {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    progress: Arc<dyn ProgressRepository>,
    creditor: SkillCreditor,
    rooms: Arc<dyn MeetingRoomProvider>,
    policy: CreditPolicy,
    locks: SessionLocks,
}

impl SessionEngine {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        progress: Arc<dyn ProgressRepository>,
        creditor: SkillCreditor,
        rooms: Arc<dyn MeetingRoomProvider>,
        policy: CreditPolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            progress,
            creditor,
            rooms,
            policy,
            locks: SessionLocks::default(),
        }
    }

    pub fn policy(&self) -> CreditPolicy {
        self.policy
    }

    /// Books a session between a mentor and a mentee. New sessions start `Confirmed`.
    pub async fn book_session(&self, request: BookingRequest) -> EngineResult<Session> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(EngineError::Validation("Session topic is required".to_string()));
        }
        if request.end_time <= request.start_time {
            return Err(EngineError::Validation(
                "Session end time must be after its start time".to_string(),
            ));
        }
        if request.price_cents < 0 {
            return Err(EngineError::Validation("Price cannot be negative".to_string()));
        }
        if request.mentor_id == request.mentee_id {
            return Err(EngineError::Validation(
                "You cannot book a session with yourself".to_string(),
            ));
        }
        match self.users.get_user(request.mentor_id).await {
            Ok(user) if user.role == Role::Mentor => {}
            Ok(_) | Err(PortError::NotFound(_)) => {
                return Err(EngineError::Validation("Mentor not found".to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        match self.users.get_user(request.mentee_id).await {
            Ok(_) => {}
            Err(PortError::NotFound(_)) => {
                return Err(EngineError::Validation("Mentee not found".to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let now = Utc::now();
        let mut session = Session {
            id: Uuid::new_v4(),
            mentor_id: request.mentor_id,
            mentee_id: request.mentee_id,
            topic: topic.to_string(),
            description: request.description,
            session_type: request.session_type,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            price_cents: request.price_cents,
            status: SessionStatus::Confirmed,
            verification: VerificationStatus::NotStarted,
            mentor_approval: Approval::default(),
            mentee_approval: Approval::default(),
            completion_notes: None,
            actual_duration_minutes: None,
            skill_claims: Vec::new(),
            meeting_link: None,
            cancellation_reason: None,
            cancelled_by: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        if session.session_type != SessionType::Chat {
            match self.rooms.create_room(&session).await {
                Ok(link) => session.meeting_link = Some(link),
                Err(e) => warn!(session_id = %session.id, error = %e, "meeting room not provisioned"),
            }
        }

        self.sessions.insert_session(&session).await?;
        info!(session_id = %session.id, mentor_id = %session.mentor_id, mentee_id = %session.mentee_id, "session booked");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid, actor: Uuid) -> EngineResult<Session> {
        let session = self.sessions.get_session(session_id).await?;
        if !session.involves(actor) {
            return Err(EngineError::Authorization(
                "You are not a participant in this session".to_string(),
            ));
        }
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> EngineResult<Vec<Session>> {
        Ok(self.sessions.list_sessions_for_user(user_id).await?)
    }

    pub async fn list_skills(&self, user_id: Uuid) -> EngineResult<Vec<Skill>> {
        self.creditor.list_skills(user_id).await
    }

    pub async fn list_progress(&self, user_id: Uuid) -> EngineResult<Vec<Progress>> {
        Ok(self.progress.list_progress_for_user(user_id).await?)
    }

    /// Mentor asks the mentee to confirm the session took place.
    pub async fn initiate_completion(
        &self,
        session_id: Uuid,
        actor: Uuid,
        report: CompletionReport,
    ) -> EngineResult<Session> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.sessions.get_session(session_id).await?;
        if session.mentor_id != actor {
            return Err(EngineError::Authorization(
                "Only the mentor can initiate session completion".to_string(),
            ));
        }
        validate_transition(session.status, SessionStatus::PendingVerification)?;

        session.status = SessionStatus::PendingVerification;
        session.verification = VerificationStatus::NotStarted;
        session.mentor_approval = Approval::default();
        session.mentee_approval = Approval::default();
        if report.notes.is_some() {
            session.completion_notes = report.notes;
        }
        if report.actual_duration_minutes.is_some() {
            session.actual_duration_minutes = report.actual_duration_minutes;
        }
        session.skill_claims = report.skills;
        session.updated_at = Utc::now();
        self.sessions.update_session(&session).await?;
        info!(%session_id, "session completion initiated");

        if self.policy == CreditPolicy::AtInitiation {
            self.credit(&session, &session.skill_claims).await?;
        }
        Ok(session)
    }

    /// Records one party's answer. Completes the session once both have approved.
    pub async fn approve_completion(
        &self,
        session_id: Uuid,
        actor: Uuid,
        input: ApprovalInput,
    ) -> EngineResult<ApprovalOutcome> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.sessions.get_session(session_id).await?;
        let party = if actor == session.mentor_id {
            Party::Mentor
        } else if actor == session.mentee_id {
            Party::Mentee
        } else {
            return Err(EngineError::Authorization(
                "Only the session's mentor or mentee can approve completion".to_string(),
            ));
        };
        if session.status != SessionStatus::PendingVerification {
            return Err(EngineError::Conflict(format!(
                "Session is {}, not awaiting completion approval",
                session.status
            )));
        }

        let now = Utc::now();
        let approval = Approval {
            approved: input.approved,
            approved_at: Some(now),
            notes: input.notes,
        };
        match party {
            Party::Mentor => session.mentor_approval = approval,
            Party::Mentee => session.mentee_approval = approval,
        }
        if input.actual_duration_minutes.is_some() {
            session.actual_duration_minutes = input.actual_duration_minutes;
        }
        session.verification = derive_verification(&session.mentor_approval, &session.mentee_approval);

        let completed = session.verification == VerificationStatus::BothApproved;
        if completed {
            validate_transition(session.status, SessionStatus::Completed)?;
            session.status = SessionStatus::Completed;
            session.completed_at = Some(now);
        }
        session.updated_at = now;
        self.sessions.update_session(&session).await?;

        if completed {
            info!(%session_id, "session completed by dual approval");
            if self.policy == CreditPolicy::AtCompletion {
                self.credit(&session, &session.skill_claims).await?;
            }
        } else {
            info!(%session_id, party = party.as_str(), approved = input.approved, verification = %session.verification, "completion approval recorded");
        }

        let awaiting = if completed {
            None
        } else if !session.mentor_approval.approved {
            Some(Party::Mentor)
        } else {
            Some(Party::Mentee)
        };
        Ok(ApprovalOutcome { session, awaiting })
    }

    /// Mentor closes the session without waiting for the mentee.
    pub async fn complete_directly(
        &self,
        session_id: Uuid,
        actor: Uuid,
        report: CompletionReport,
    ) -> EngineResult<Session> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.sessions.get_session(session_id).await?;
        if session.mentor_id != actor {
            return Err(EngineError::Authorization(
                "Only the mentor can complete a session directly".to_string(),
            ));
        }
        validate_transition(session.status, SessionStatus::Completed)?;

        let now = Utc::now();
        session.status = SessionStatus::Completed;
        session.verification = VerificationStatus::DirectCompletion;
        session.completed_at = Some(now);
        if report.notes.is_some() {
            session.completion_notes = report.notes;
        }
        if report.actual_duration_minutes.is_some() {
            session.actual_duration_minutes = report.actual_duration_minutes;
        }
        let claims = if report.skills.is_empty() {
            session.skill_claims.clone()
        } else {
            report.skills.clone()
        };
        session.skill_claims = claims;
        session.updated_at = now;
        self.sessions.update_session(&session).await?;
        info!(%session_id, "session completed directly by mentor");

        let to_credit = match self.policy {
            CreditPolicy::AtInitiation => report.skills,
            CreditPolicy::AtCompletion => session.skill_claims.clone(),
        };
        self.credit(&session, &to_credit).await?;
        Ok(session)
    }

    pub async fn cancel_session(
        &self,
        session_id: Uuid,
        actor: Uuid,
        reason: Option<String>,
    ) -> EngineResult<Session> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.sessions.get_session(session_id).await?;
        if !session.involves(actor) {
            return Err(EngineError::Authorization(
                "Only the session's mentor or mentee can cancel it".to_string(),
            ));
        }
        if session.status == SessionStatus::Cancelled {
            return Err(EngineError::Validation("Session is already cancelled".to_string()));
        }
        validate_transition(session.status, SessionStatus::Cancelled)?;

        session.status = SessionStatus::Cancelled;
        session.cancellation_reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        session.cancelled_by = Some(actor);
        session.updated_at = Utc::now();
        self.sessions.update_session(&session).await?;
        info!(%session_id, cancelled_by = %actor, "session cancelled");
        Ok(session)
    }

    /// Scheduling status changes made by the mentor (confirm, mark missed).
    /// Completion and cancellation have their own operations.
    pub async fn update_status(
        &self,
        session_id: Uuid,
        actor: Uuid,
        status: SessionStatus,
    ) -> EngineResult<Session> {
        if !matches!(
            status,
            SessionStatus::Upcoming | SessionStatus::Confirmed | SessionStatus::Missed
        ) {
            return Err(EngineError::Validation(format!(
                "Status '{}' cannot be set directly",
                status
            )));
        }
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.sessions.get_session(session_id).await?;
        if session.mentor_id != actor {
            return Err(EngineError::Authorization(
                "Only the mentor can change the session status".to_string(),
            ));
        }
        validate_transition(session.status, status)?;

        session.status = status;
        session.updated_at = Utc::now();
        self.sessions.update_session(&session).await?;
        info!(%session_id, status = %status, "session status updated");
        Ok(session)
    }

    /// Credits the mentee's skills and appends one ledger entry for the session.
    async fn credit(&self, session: &Session, claims: &[SkillClaim]) -> EngineResult<()> {
        let credited = self
            .creditor
            .credit_skills(session.mentee_id, claims, CreditSource::Session(session.id))
            .await?;
        let entry = Progress {
            id: Uuid::new_v4(),
            user_id: session.mentee_id,
            kind: ProgressKind::SessionCompleted,
            value: 1,
            session_id: Some(session.id),
            metrics: ProgressMetrics {
                skills_improved: credited.len() as u32,
                skill_names: credited.into_iter().map(|s| s.name).collect(),
                session_duration_minutes: session.actual_duration_minutes,
            },
            created_at: Utc::now(),
        };
        self.progress.append_progress(&entry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SkillStatus, User};
    use crate::memory::InMemoryStore;
    use crate::ports::MeetingRoomProvider;
    use crate::testing::{register, BrokenRooms, StaticRooms};
    use chrono::{NaiveDate, NaiveTime};

    struct Harness {
        engine: Arc<SessionEngine>,
        mentor: User,
        mentee: User,
    }

    async fn harness_with(policy: CreditPolicy, rooms: Arc<dyn MeetingRoomProvider>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(SessionEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            SkillCreditor::new(store.clone()),
            rooms,
            policy,
        ));
        let mentor = register(&store, "Theo", Role::Mentor).await;
        let mentee = register(&store, "Mia", Role::Mentee).await;
        Harness {
            engine,
            mentor,
            mentee,
        }
    }

    async fn harness() -> Harness {
        harness_with(CreditPolicy::AtInitiation, Arc::new(StaticRooms)).await
    }

    fn booking(h: &Harness) -> BookingRequest {
        BookingRequest {
            mentor_id: h.mentor.id,
            mentee_id: h.mentee.id,
            topic: "Intro to React".into(),
            description: None,
            session_type: SessionType::Video,
            date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            price_cents: 4500,
        }
    }

    fn approve(approved: bool) -> ApprovalInput {
        ApprovalInput {
            approved,
            notes: None,
            actual_duration_minutes: None,
        }
    }

    fn report(skills: &[&str]) -> CompletionReport {
        CompletionReport {
            notes: Some("good session".into()),
            skills: skills.iter().map(|s| SkillClaim::named(*s)).collect(),
            actual_duration_minutes: Some(55),
        }
    }

    async fn pending(h: &Harness) -> Session {
        let session = h.engine.book_session(booking(h)).await.unwrap();
        h.engine
            .initiate_completion(session.id, h.mentor.id, CompletionReport::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn booking_starts_confirmed_with_meeting_link() {
        let h = harness().await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Confirmed);
        assert_eq!(session.verification, VerificationStatus::NotStarted);
        assert_eq!(
            session.meeting_link,
            Some(format!("https://rooms.test/{}", session.id))
        );
    }

    #[tokio::test]
    async fn booking_survives_room_provider_failure() {
        let h = harness_with(CreditPolicy::AtInitiation, Arc::new(BrokenRooms)).await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();
        assert!(session.meeting_link.is_none());
    }

    #[tokio::test]
    async fn booking_validates_input() {
        let h = harness().await;

        let mut bad = booking(&h);
        bad.topic = "  ".into();
        assert!(matches!(h.engine.book_session(bad).await, Err(EngineError::Validation(_))));

        let mut bad = booking(&h);
        bad.end_time = bad.start_time;
        assert!(matches!(h.engine.book_session(bad).await, Err(EngineError::Validation(_))));

        // A mentee cannot be booked as the mentor.
        let mut bad = booking(&h);
        bad.mentor_id = h.mentee.id;
        bad.mentee_id = h.mentor.id;
        assert!(matches!(h.engine.book_session(bad).await, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn initiation_credits_skills_immediately() {
        let h = harness().await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();

        let updated = h
            .engine
            .initiate_completion(session.id, h.mentor.id, report(&["React"]))
            .await
            .unwrap();
        assert_eq!(updated.status, SessionStatus::PendingVerification);
        assert_eq!(updated.verification, VerificationStatus::NotStarted);

        let skills = h.engine.list_skills(h.mentee.id).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].progress, 10);
        assert_eq!(skills[0].status, SkillStatus::Learning);

        h.engine
            .initiate_completion(session.id, h.mentor.id, report(&["React"]))
            .await
            .unwrap();
        let skills = h.engine.list_skills(h.mentee.id).await.unwrap();
        assert_eq!(skills[0].progress, 20);

        let ledger = h.engine.list_progress(h.mentee.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].kind, ProgressKind::SessionCompleted);
        assert_eq!(ledger[0].metrics.skill_names, vec!["React".to_string()]);
    }

    #[tokio::test]
    async fn only_mentor_initiates() {
        let h = harness().await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();
        assert!(matches!(
            h.engine
                .initiate_completion(session.id, h.mentee.id, CompletionReport::default())
                .await,
            Err(EngineError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn both_approvals_complete_the_session() {
        let h = harness().await;
        let session = pending(&h).await;

        let first = h
            .engine
            .approve_completion(session.id, h.mentor.id, approve(true))
            .await
            .unwrap();
        assert!(!first.completed());
        assert_eq!(first.awaiting, Some(Party::Mentee));
        assert_eq!(first.session.verification, VerificationStatus::MentorApproved);
        assert!(first.session.completed_at.is_none());

        let second = h
            .engine
            .approve_completion(session.id, h.mentee.id, approve(true))
            .await
            .unwrap();
        assert!(second.completed());
        assert_eq!(second.awaiting, None);
        assert_eq!(second.session.verification, VerificationStatus::BothApproved);
        assert!(second.session.completed_at.is_some());
    }

    #[tokio::test]
    async fn rejection_keeps_session_pending_and_disputed() {
        let h = harness().await;
        let session = pending(&h).await;

        h.engine
            .approve_completion(session.id, h.mentor.id, approve(true))
            .await
            .unwrap();
        let outcome = h
            .engine
            .approve_completion(session.id, h.mentee.id, approve(false))
            .await
            .unwrap();
        assert_eq!(outcome.session.status, SessionStatus::PendingVerification);
        assert_eq!(outcome.session.verification, VerificationStatus::Disputed);
        assert!(outcome.session.mentee_approval.is_rejection());
        assert_eq!(outcome.awaiting, Some(Party::Mentee));

        // Changing their mind completes it.
        let outcome = h
            .engine
            .approve_completion(session.id, h.mentee.id, approve(true))
            .await
            .unwrap();
        assert!(outcome.completed());
    }

    #[tokio::test]
    async fn completed_at_is_never_restamped() {
        let h = harness().await;
        let session = pending(&h).await;
        h.engine.approve_completion(session.id, h.mentor.id, approve(true)).await.unwrap();
        let done = h
            .engine
            .approve_completion(session.id, h.mentee.id, approve(true))
            .await
            .unwrap()
            .session;

        let again = h.engine.approve_completion(session.id, h.mentee.id, approve(true)).await;
        assert!(matches!(again, Err(EngineError::Conflict(_))));
        let stored = h.engine.get_session(session.id, h.mentee.id).await.unwrap();
        assert_eq!(stored.completed_at, done.completed_at);

        // And completed sessions cannot go back to verification.
        assert!(matches!(
            h.engine
                .initiate_completion(session.id, h.mentor.id, CompletionReport::default())
                .await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn outsiders_cannot_approve() {
        let h = harness().await;
        let session = pending(&h).await;
        assert!(matches!(
            h.engine.approve_completion(session.id, Uuid::new_v4(), approve(true)).await,
            Err(EngineError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_approvals_complete_exactly_once() {
        for _ in 0..20 {
            let h = harness().await;
            let session = pending(&h).await;

            let mentor_call = {
                let engine = h.engine.clone();
                let actor = h.mentor.id;
                tokio::spawn(async move { engine.approve_completion(session.id, actor, approve(true)).await })
            };
            let mentee_call = {
                let engine = h.engine.clone();
                let actor = h.mentee.id;
                tokio::spawn(async move { engine.approve_completion(session.id, actor, approve(true)).await })
            };
            let a = mentor_call.await.unwrap().unwrap();
            let b = mentee_call.await.unwrap().unwrap();

            assert_eq!(
                [a.completed(), b.completed()].iter().filter(|c| **c).count(),
                1
            );
            let stored = h.engine.get_session(session.id, h.mentor.id).await.unwrap();
            assert_eq!(stored.status, SessionStatus::Completed);
            assert!(stored.mentor_approval.approved && stored.mentee_approval.approved);
            assert_eq!(h.engine.locks.len(), 0);
        }
    }

    #[tokio::test]
    async fn direct_completion_skips_approvals() {
        let h = harness().await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();

        let done = h
            .engine
            .complete_directly(session.id, h.mentor.id, report(&["TypeScript"]))
            .await
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.verification, VerificationStatus::DirectCompletion);
        assert!(done.completed_at.is_some());
        assert!(!done.mentee_approval.approved);
        assert_eq!(done.actual_duration_minutes, Some(55));

        let skills = h.engine.list_skills(h.mentee.id).await.unwrap();
        assert_eq!(skills[0].name, "TypeScript");
        assert_eq!(h.engine.list_progress(h.mentee.id).await.unwrap().len(), 1);

        assert!(matches!(
            h.engine
                .complete_directly(session.id, h.mentee.id, CompletionReport::default())
                .await,
            Err(EngineError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn completion_policy_defers_credit() {
        let h = harness_with(CreditPolicy::AtCompletion, Arc::new(StaticRooms)).await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();
        h.engine
            .initiate_completion(session.id, h.mentor.id, report(&["React"]))
            .await
            .unwrap();
        assert!(h.engine.list_skills(h.mentee.id).await.unwrap().is_empty());

        h.engine.approve_completion(session.id, h.mentor.id, approve(true)).await.unwrap();
        assert!(h.engine.list_skills(h.mentee.id).await.unwrap().is_empty());

        h.engine.approve_completion(session.id, h.mentee.id, approve(true)).await.unwrap();
        let skills = h.engine.list_skills(h.mentee.id).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].progress, 10);
        assert_eq!(h.engine.list_progress(h.mentee.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn double_cancel_is_rejected_without_corruption() {
        let h = harness().await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();

        let cancelled = h
            .engine
            .cancel_session(session.id, h.mentee.id, Some("conflict".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("conflict"));

        assert!(matches!(
            h.engine.cancel_session(session.id, h.mentor.id, None).await,
            Err(EngineError::Validation(_))
        ));
        let stored = h.engine.get_session(session.id, h.mentor.id).await.unwrap();
        assert_eq!(stored.cancelled_by, Some(h.mentee.id));
    }

    #[tokio::test]
    async fn completed_sessions_cannot_be_cancelled() {
        let h = harness().await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();
        h.engine
            .complete_directly(session.id, h.mentor.id, CompletionReport::default())
            .await
            .unwrap();
        assert!(matches!(
            h.engine.cancel_session(session.id, h.mentor.id, None).await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn mentor_marks_missed() {
        let h = harness().await;
        let session = h.engine.book_session(booking(&h)).await.unwrap();
        assert!(matches!(
            h.engine
                .update_status(session.id, h.mentor.id, SessionStatus::Completed)
                .await,
            Err(EngineError::Validation(_))
        ));
        let missed = h
            .engine
            .update_status(session.id, h.mentor.id, SessionStatus::Missed)
            .await
            .unwrap();
        assert_eq!(missed.status, SessionStatus::Missed);
    }

    #[test]
    fn credit_policy_parses() {
        assert_eq!("completion".parse::<CreditPolicy>().unwrap(), CreditPolicy::AtCompletion);
        assert_eq!("Initiation".parse::<CreditPolicy>().unwrap(), CreditPolicy::AtInitiation);
        assert!("never".parse::<CreditPolicy>().is_err());
    }
}
