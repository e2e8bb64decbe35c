//! Session state machine with validated transitions.
//!
//! Booked sessions start out `Confirmed` (or `Upcoming`) and end in exactly one
//! of the terminal states `Completed`, `Cancelled` or `Missed`:
//!
//! Upcoming -> Confirmed -> PendingVerification -> Completed
//!
//! with `Cancelled` reachable from every non-terminal state, `Missed` from the
//! two pre-session states, and direct completion skipping verification.

use std::fmt;
use std::str::FromStr;

use crate::domain::{Approval, UnknownVariant};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Upcoming,
    Confirmed,
    PendingVerification,
    Completed,
    Cancelled,
    Missed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Upcoming => "upcoming",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::PendingVerification => "pending_verification",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Missed => "missed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Missed
        )
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(SessionStatus::Upcoming),
            "confirmed" => Ok(SessionStatus::Confirmed),
            "pending_verification" => Ok(SessionStatus::PendingVerification),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "missed" => Ok(SessionStatus::Missed),
            other => Err(UnknownVariant::new("session status", other)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-state of the completion handshake. Only meaningful while the session
/// is `PendingVerification`, or as a record of how it reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    NotStarted,
    MentorApproved,
    MenteeApproved,
    BothApproved,
    Disputed,
    DirectCompletion,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::NotStarted => "not_started",
            VerificationStatus::MentorApproved => "mentor_approved",
            VerificationStatus::MenteeApproved => "mentee_approved",
            VerificationStatus::BothApproved => "both_approved",
            VerificationStatus::Disputed => "disputed",
            VerificationStatus::DirectCompletion => "direct_completion",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(VerificationStatus::NotStarted),
            "mentor_approved" => Ok(VerificationStatus::MentorApproved),
            "mentee_approved" => Ok(VerificationStatus::MenteeApproved),
            "both_approved" => Ok(VerificationStatus::BothApproved),
            "disputed" => Ok(VerificationStatus::Disputed),
            "direct_completion" => Ok(VerificationStatus::DirectCompletion),
            other => Err(UnknownVariant::new("verification status", other)),
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a session an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Mentor,
    Mentee,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Mentor => "mentor",
            Party::Mentee => "mentee",
        }
    }
}

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - Upcoming -> Confirmed
/// - Upcoming | Confirmed -> PendingVerification
/// - PendingVerification -> PendingVerification (mentor re-initiates)
/// - Upcoming | Confirmed | PendingVerification -> Completed
/// - Upcoming | Confirmed | PendingVerification -> Cancelled
/// - Upcoming | Confirmed -> Missed
pub fn validate_transition(from: SessionStatus, to: SessionStatus) -> Result<(), EngineError> {
    use SessionStatus::*;

    let valid = matches!(
        (from, to),
        (Upcoming, Confirmed)
            | (Upcoming | Confirmed | PendingVerification, PendingVerification)
            | (Upcoming | Confirmed | PendingVerification, Completed)
            | (Upcoming | Confirmed | PendingVerification, Cancelled)
            | (Upcoming | Confirmed, Missed)
    );

    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// Derive the verification sub-state from the two approval records.
pub fn derive_verification(mentor: &Approval, mentee: &Approval) -> VerificationStatus {
    if mentor.approved && mentee.approved {
        VerificationStatus::BothApproved
    } else if mentor.is_rejection() || mentee.is_rejection() {
        VerificationStatus::Disputed
    } else if mentor.approved {
        VerificationStatus::MentorApproved
    } else if mentee.approved {
        VerificationStatus::MenteeApproved
    } else {
        VerificationStatus::NotStarted
    }
}
