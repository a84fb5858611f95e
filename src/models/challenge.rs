use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChallengeId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Active,
    Completed,
}

/// A challenge as proposed by the user or by the oracle, before it is stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeIdea {
    pub title: String,
    pub description: String,
    pub goal: u32,
}

/// A user-defined goal: complete `goal` games matching the description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: ChallengeId,
    pub title: String,
    pub description: String,
    pub goal: u32,
    pub progress: u32,
    pub status: ChallengeStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Challenge {
    pub fn new(id: ChallengeId, idea: ChallengeIdea, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: idea.title,
            description: idea.description,
            goal: idea.goal,
            progress: 0,
            status: ChallengeStatus::Active,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ChallengeStatus::Active
    }

    /// Adds one unit of progress, capped at the goal.
    ///
    /// Reaching the goal completes the challenge; `completed_at` is stamped
    /// only on that transition. Returns false when nothing changed.
    pub fn record_progress(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active() || self.progress >= self.goal {
            return false;
        }
        self.progress += 1;
        if self.progress == self.goal {
            self.status = ChallengeStatus::Completed;
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        }
        true
    }
}
