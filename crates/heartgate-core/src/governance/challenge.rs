//! Challenge runtime state.
//!
//! A challenge is a time-boxed sub-requirement demanding that some of
//! the active participants reach a target zone before a deadline. Only
//! wall-clock time spent in phase Green counts against the limit: when
//! governance leaves Green with a challenge still pending, the
//! remaining time is frozen and restored on resume.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RequirementRule;

/// Completed-challenge history is bounded to this many entries.
pub const CHALLENGE_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Success,
    Failed,
}

/// A live challenge instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveChallenge {
    pub id: String,
    pub policy_id: String,
    /// Target zone the selected participants must reach.
    pub zone_id: String,
    pub rule: RequirementRule,
    /// Rule resolved against the headcount at activation time.
    pub required_count: usize,
    pub time_limit_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ChallengeStatus,
    /// Frozen remaining time while governance is away from Green.
    #[serde(default)]
    pub paused_remaining_ms: Option<u64>,
}

impl ActiveChallenge {
    pub fn new(
        policy_id: &str,
        zone_id: &str,
        rule: RequirementRule,
        required_count: usize,
        time_limit_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            policy_id: policy_id.to_string(),
            zone_id: zone_id.to_string(),
            rule,
            required_count,
            time_limit_seconds,
            started_at: now,
            expires_at: now + Duration::seconds(time_limit_seconds as i64),
            status: ChallengeStatus::Pending,
            paused_remaining_ms: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_remaining_ms.is_some()
    }

    /// Freeze the remaining time. Idempotent.
    pub fn pause(&mut self, now: DateTime<Utc>) -> u64 {
        if let Some(frozen) = self.paused_remaining_ms {
            return frozen;
        }
        let remaining = (self.expires_at - now).num_milliseconds().max(0) as u64;
        self.paused_remaining_ms = Some(remaining);
        remaining
    }

    /// Restore the frozen remaining time, pushing `expires_at` out so
    /// the pause never counts against the limit. Returns the restored
    /// remaining milliseconds.
    pub fn resume(&mut self, now: DateTime<Utc>) -> u64 {
        match self.paused_remaining_ms.take() {
            Some(remaining) => {
                self.expires_at = now + Duration::milliseconds(remaining as i64);
                remaining
            }
            None => (self.expires_at - now).num_milliseconds().max(0) as u64,
        }
    }
}

/// Preview of the upcoming scheduled challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextChallengePreview {
    pub policy_id: String,
    pub config_id: String,
    pub fires_at: DateTime<Utc>,
}

/// Archived outcome of a finished challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeOutcome {
    pub id: String,
    pub zone_id: String,
    pub required_count: usize,
    pub status: ChallengeStatus,
    pub completed_at: DateTime<Utc>,
}

impl ChallengeOutcome {
    pub fn from_challenge(challenge: &ActiveChallenge, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: challenge.id.clone(),
            zone_id: challenge.zone_id.clone(),
            required_count: challenge.required_count,
            status: challenge.status,
            completed_at,
        }
    }
}
