use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::governance::GovernancePhase;

/// Every externally visible state change produces an Event.
/// The UI polls for events; collaborators subscribe to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ParticipantActive {
        participant_id: String,
        at: DateTime<Utc>,
    },
    ParticipantInactive {
        participant_id: String,
        at: DateTime<Utc>,
    },
    ParticipantRemoved {
        participant_id: String,
        at: DateTime<Utc>,
    },
    CoinsCommitted {
        user: String,
        zone_id: String,
        coins: u64,
        total_coins: u64,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        from: GovernancePhase,
        to: GovernancePhase,
        at: DateTime<Utc>,
    },
    ChallengeScheduled {
        challenge_id: String,
        fires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ChallengeStarted {
        challenge_id: String,
        zone_id: String,
        required_count: usize,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ChallengeSucceeded {
        challenge_id: String,
        at: DateTime<Utc>,
    },
    ChallengeFailed {
        challenge_id: String,
        at: DateTime<Utc>,
    },
    /// Pending challenge frozen because playback governance left Green.
    ChallengePaused {
        challenge_id: String,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    ChallengeResumed {
        challenge_id: String,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    SessionStarted {
        session_id: String,
        at: DateTime<Utc>,
    },
    SessionStopped {
        session_id: String,
        at: DateTime<Utc>,
    },
}
