//! crates/mentorpulse_core/src/skills.rs
//!
//! The skill crediting routine shared by session completion and goal completion.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Skill, SkillClaim, SkillStatus};
use crate::error::EngineResult;
use crate::ports::SkillRepository;

pub const SESSION_CREDIT_STEP: u8 = 10;
pub const GOAL_CREDIT_STEP: u8 = 25;
pub const MAX_PROGRESS: u8 = 100;
pub const ACQUIRED_THRESHOLD: u8 = 80;

impl SkillStatus {
    /// >= 80 is acquired, exactly 100 is mastered.
    pub fn from_progress(progress: u8) -> Self {
        if progress >= MAX_PROGRESS {
            SkillStatus::Mastered
        } else if progress >= ACQUIRED_THRESHOLD {
            SkillStatus::Acquired
        } else {
            SkillStatus::Learning
        }
    }
}

/// What earned the credit. Decides the step size and which link list is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditSource {
    Session(Uuid),
    Goal(Uuid),
}

impl CreditSource {
    pub fn step(&self) -> u8 {
        match self {
            CreditSource::Session(_) => SESSION_CREDIT_STEP,
            CreditSource::Goal(_) => GOAL_CREDIT_STEP,
        }
    }
}

/// Adds one step of progress to an existing skill and links the source once.
pub fn apply_credit(skill: &mut Skill, source: CreditSource, now: DateTime<Utc>) {
    skill.progress = skill.progress.saturating_add(source.step()).min(MAX_PROGRESS);
    skill.status = SkillStatus::from_progress(skill.progress);
    let (links, id) = match source {
        CreditSource::Session(id) => (&mut skill.session_ids, id),
        CreditSource::Goal(id) => (&mut skill.goal_ids, id),
    };
    if !links.contains(&id) {
        links.push(id);
    }
    skill.updated_at = now;
}

/// A skill seen for the first time, starting at one step of progress.
pub fn new_credited_skill(
    user_id: Uuid,
    claim: &SkillClaim,
    source: CreditSource,
    now: DateTime<Utc>,
) -> Skill {
    let mut skill = Skill {
        id: Uuid::new_v4(),
        user_id,
        name: claim.name.trim().to_string(),
        category: claim.category.clone(),
        proficiency: claim.proficiency.clone(),
        description: claim.description.clone(),
        progress: 0,
        status: SkillStatus::Learning,
        session_ids: Vec::new(),
        goal_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    apply_credit(&mut skill, source, now);
    skill
}

#[derive(Clone)]
pub struct SkillCreditor {
    skills: Arc<dyn SkillRepository>,
}

impl SkillCreditor {
    pub fn new(skills: Arc<dyn SkillRepository>) -> Self {
        Self { skills }
    }

    /// Credits every claim to `user_id` and returns the resulting skills.
    /// Claims with a blank name are skipped.
    pub async fn credit_skills(
        &self,
        user_id: Uuid,
        claims: &[SkillClaim],
        source: CreditSource,
    ) -> EngineResult<Vec<Skill>> {
        let mut credited = Vec::with_capacity(claims.len());
        for claim in claims {
            if claim.name.trim().is_empty() {
                warn!(%user_id, "skipping skill claim with an empty name");
                continue;
            }
            let fresh = new_credited_skill(user_id, claim, source, Utc::now());
            credited.push(self.skills.credit_skill(&fresh, source).await?);
        }
        if !credited.is_empty() {
            info!(%user_id, ?source, count = credited.len(), "skills credited");
        }
        Ok(credited)
    }

    pub async fn list_skills(&self, user_id: Uuid) -> EngineResult<Vec<Skill>> {
        Ok(self.skills.list_skills_for_user(user_id).await?)
    }
}
