//! Governance Engine.
//!
//! A policy-driven gate conditioning continued media playback on
//! measured physical activity. The engine is a wall-clock state
//! machine in the same mold as the accrual engine: no internal
//! threads, the caller invokes `evaluate()` once per tick with the
//! current roster snapshot and `now`.
//!
//! ## Phase transitions
//!
//! ```text
//! Idle ──set governed media──▶ Init ──requirements met──▶ Green
//! Green ──requirements lost──▶ Yellow ──grace expiry──▶ Red
//! Yellow ──requirements met──▶ Green
//! Green ──challenge failed──▶ Red (latched until cleared externally)
//! ```
//!
//! Green is never left for Red except through grace expiry or a failed
//! challenge. Losing requirements before they were ever met this media
//! keeps the engine in Init with no countdown.

mod challenge;
mod requirement;
mod selection;

pub use challenge::{
    ActiveChallenge, ChallengeOutcome, ChallengeStatus, NextChallengePreview,
    CHALLENGE_HISTORY_LIMIT,
};
pub use requirement::{evaluate_requirements, select_policy, RequirementStatus};
pub use selection::SelectionState;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};

use crate::config::{ChallengeSelection, GovernancePolicy};
use crate::events::Event;
use crate::roster::{MediaDescriptor, Participant};
use crate::timing::DeadlineScheduler;
use crate::zone::ZoneSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernancePhase {
    /// Not governing (no media, ungoverned media, or no policies).
    Idle,
    /// Governed media, requirements not yet met this media.
    Init,
    Green,
    /// Requirements lost after Green; grace countdown running.
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum TimerKind {
    Grace,
    ChallengeExpiry,
    NextChallenge,
}

/// State snapshot handed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceState {
    pub status: GovernancePhase,
    pub requirements: Vec<RequirementStatus>,
    pub challenge: Option<ActiveChallenge>,
    pub next_challenge: Option<NextChallengePreview>,
    pub challenge_history: Vec<ChallengeOutcome>,
    /// Seconds left in the grace countdown while Yellow.
    pub countdown_seconds_remaining: Option<u64>,
    pub video_locked: bool,
}

/// Phase/challenge state machine gating playback on activity.
pub struct GovernanceEngine {
    policies: Vec<GovernancePolicy>,
    governed_labels: Vec<String>,
    grace_period_secs: u64,
    zones: ZoneSet,
    rng: Mcg128Xsl64,
    scheduler: DeadlineScheduler<TimerKind>,

    media: Option<MediaDescriptor>,
    governed: bool,
    phase: GovernancePhase,
    /// Requirements were met at least once for the current media.
    satisfied_this_media: bool,
    /// A failed challenge forces Red until cleared externally.
    failed_latch: bool,
    active_challenge: Option<ActiveChallenge>,
    next_challenge: Option<NextChallengePreview>,
    selection_states: HashMap<String, SelectionState>,
    history: VecDeque<ChallengeOutcome>,
    last_requirements: Vec<RequirementStatus>,
    last_policy_id: Option<String>,
    last_active_count: usize,
}

impl GovernanceEngine {
    pub fn new(
        policies: Vec<GovernancePolicy>,
        governed_labels: Vec<String>,
        grace_period_secs: u64,
        zones: ZoneSet,
        seed: Option<u64>,
    ) -> Self {
        Self {
            policies,
            governed_labels,
            grace_period_secs,
            zones,
            rng: Mcg128Xsl64::seed_from_u64(seed.unwrap_or_else(|| rand::thread_rng().gen())),
            scheduler: DeadlineScheduler::new(),
            media: None,
            governed: false,
            phase: GovernancePhase::Idle,
            satisfied_this_media: false,
            failed_latch: false,
            active_challenge: None,
            next_challenge: None,
            selection_states: HashMap::new(),
            history: VecDeque::new(),
            last_requirements: Vec::new(),
            last_policy_id: None,
            last_active_count: 0,
        }
    }

    pub fn phase(&self) -> GovernancePhase {
        self.phase
    }

    /// Swap in a new zone profile. Ranks re-resolve on the next
    /// evaluation; phase and challenge state are untouched.
    pub fn set_zones(&mut self, zones: ZoneSet) {
        self.zones = zones;
    }

    /// Switch the governed media. Governance engages only when the
    /// media's labels or type intersect the configured governed set.
    /// Per-media state (satisfaction memory, grace, challenges, the
    /// failure latch) resets; challenge history survives the session.
    pub fn set_media(&mut self, media: Option<MediaDescriptor>, now: DateTime<Utc>) -> Vec<Event> {
        self.governed = media
            .as_ref()
            .is_some_and(|m| m.matches_any(&self.governed_labels));
        self.media = media;
        self.satisfied_this_media = false;
        self.failed_latch = false;
        self.active_challenge = None;
        self.next_challenge = None;
        self.scheduler.clear();

        let target = if self.governed && !self.policies.is_empty() {
            GovernancePhase::Init
        } else {
            GovernancePhase::Idle
        };
        self.transition(target, now)
    }

    /// The per-tick evaluation. Single entry point for all phase and
    /// challenge logic; timers only ever fire from in here.
    pub fn evaluate(&mut self, roster: &[Participant], now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        let fired = self.scheduler.poll(now);
        let fired_grace = fired.contains(&TimerKind::Grace);
        let fired_expiry = fired.contains(&TimerKind::ChallengeExpiry);
        let fired_next = fired.contains(&TimerKind::NextChallenge);

        let active: Vec<&Participant> = roster.iter().filter(|p| p.is_active).collect();
        let count = active.len();
        self.last_active_count = count;

        if !self.governed {
            events.extend(self.transition(GovernancePhase::Idle, now));
            self.last_requirements.clear();
            return events;
        }

        let Some(policy) = select_policy(&self.policies, count).cloned() else {
            events.extend(self.transition(GovernancePhase::Idle, now));
            self.last_requirements.clear();
            return events;
        };
        self.last_policy_id = Some(policy.id.clone());

        let requirements = evaluate_requirements(&policy, &self.zones, &active);
        // An empty requirement map is vacuously satisfied.
        let satisfied = requirements.iter().all(|r| r.satisfied);
        self.last_requirements = requirements;

        let target = if self.failed_latch {
            GovernancePhase::Red
        } else if count == 0 {
            GovernancePhase::Init
        } else if satisfied {
            GovernancePhase::Green
        } else if !self.satisfied_this_media {
            GovernancePhase::Init
        } else if self.grace_period_secs == 0 {
            GovernancePhase::Red
        } else if fired_grace || self.phase == GovernancePhase::Red {
            GovernancePhase::Red
        } else {
            if !self.scheduler.is_armed(TimerKind::Grace) {
                self.scheduler.arm(
                    TimerKind::Grace,
                    now + Duration::seconds(self.grace_period_secs as i64),
                );
            }
            GovernancePhase::Yellow
        };

        if satisfied {
            self.satisfied_this_media = true;
            self.scheduler.cancel(TimerKind::Grace);
        }

        events.extend(self.transition(target, now));

        if self.phase == GovernancePhase::Green && !self.failed_latch {
            events.extend(self.drive_challenges(&policy, &active, fired_expiry, fired_next, now));
        }
        events
    }

    /// Force-start a challenge immediately, bypassing the headcount
    /// minimum and, when `payload` is given, the selection algorithm.
    pub fn trigger_challenge_now(
        &mut self,
        payload: Option<ChallengeSelection>,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let selection = payload.or_else(|| {
            let policy = self
                .last_policy_id
                .as_ref()
                .and_then(|id| self.policies.iter().find(|p| &p.id == id))
                .or_else(|| self.policies.first())?
                .clone();
            let config = policy.challenges.first()?;
            let candidates: Vec<usize> = (0..config.selections.len()).collect();
            let state = self.selection_states.entry(config.id.clone()).or_default();
            let index = state.pick(config, &candidates, &mut self.rng)?;
            Some(config.selections[index].clone())
        });
        let Some(selection) = selection else {
            return Vec::new();
        };

        let policy_id = self.last_policy_id.clone().unwrap_or_default();
        let required_count = selection.rule.required_count(self.last_active_count);
        let mut challenge = ActiveChallenge::new(
            &policy_id,
            &selection.zone,
            selection.rule,
            required_count,
            selection.time_limit_seconds,
            now,
        );
        self.next_challenge = None;
        self.scheduler.cancel(TimerKind::NextChallenge);
        if self.phase == GovernancePhase::Green {
            self.scheduler.arm(TimerKind::ChallengeExpiry, challenge.expires_at);
        } else {
            // Outside Green the clock must not run; the challenge
            // starts frozen and resumes when Green returns.
            challenge.pause(now);
        }
        let event = Event::ChallengeStarted {
            challenge_id: challenge.id.clone(),
            zone_id: challenge.zone_id.clone(),
            required_count,
            expires_at: challenge.expires_at,
            at: now,
        };
        self.active_challenge = Some(challenge);
        vec![event]
    }

    /// Release the Red latch after a failed challenge. Phase recovers
    /// on the next evaluation.
    pub fn clear_failed_challenge(&mut self) {
        self.failed_latch = false;
        if self
            .active_challenge
            .as_ref()
            .is_some_and(|c| c.status == ChallengeStatus::Failed)
        {
            self.active_challenge = None;
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> GovernanceState {
        let countdown = (self.phase == GovernancePhase::Yellow)
            .then(|| self.scheduler.deadline(TimerKind::Grace))
            .flatten()
            .map(|deadline| (deadline - now).num_seconds().max(0) as u64);
        GovernanceState {
            status: self.phase,
            requirements: self.last_requirements.clone(),
            challenge: self.active_challenge.clone(),
            next_challenge: self.next_challenge.clone(),
            challenge_history: self.history.iter().cloned().collect(),
            countdown_seconds_remaining: countdown,
            video_locked: self.phase == GovernancePhase::Red
                || (self.governed && self.phase == GovernancePhase::Init),
        }
    }

    /// Session teardown: cancel timers, drop all runtime state.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.media = None;
        self.governed = false;
        self.phase = GovernancePhase::Idle;
        self.satisfied_this_media = false;
        self.failed_latch = false;
        self.active_challenge = None;
        self.next_challenge = None;
        self.selection_states.clear();
        self.history.clear();
        self.last_requirements.clear();
        self.last_policy_id = None;
        self.last_active_count = 0;
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn transition(&mut self, target: GovernancePhase, now: DateTime<Utc>) -> Vec<Event> {
        if self.phase == target {
            return Vec::new();
        }
        let mut events = Vec::new();
        let leaving_green = self.phase == GovernancePhase::Green;
        let entering_green = target == GovernancePhase::Green;
        log::debug!("governance: {:?} -> {:?}", self.phase, target);
        events.push(Event::PhaseChanged {
            from: self.phase,
            to: target,
            at: now,
        });
        self.phase = target;

        if leaving_green {
            // A pending challenge freezes; the preview is dropped and
            // rescheduled fresh when Green returns.
            if let Some(challenge) = self.active_challenge.as_mut() {
                if challenge.status == ChallengeStatus::Pending {
                    let remaining_ms = challenge.pause(now);
                    self.scheduler.cancel(TimerKind::ChallengeExpiry);
                    events.push(Event::ChallengePaused {
                        challenge_id: challenge.id.clone(),
                        remaining_ms,
                        at: now,
                    });
                }
            }
            self.next_challenge = None;
            self.scheduler.cancel(TimerKind::NextChallenge);
        }
        if entering_green {
            if let Some(challenge) = self.active_challenge.as_mut() {
                if challenge.is_paused() {
                    let remaining_ms = challenge.resume(now);
                    self.scheduler.arm(TimerKind::ChallengeExpiry, challenge.expires_at);
                    events.push(Event::ChallengeResumed {
                        challenge_id: challenge.id.clone(),
                        remaining_ms,
                        at: now,
                    });
                }
            }
        }
        events
    }

    fn drive_challenges(
        &mut self,
        policy: &GovernancePolicy,
        active: &[&Participant],
        fired_expiry: bool,
        fired_next: bool,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let mut events = Vec::new();

        if let Some(mut challenge) = self.active_challenge.take() {
            if challenge.status == ChallengeStatus::Pending && !challenge.is_paused() {
                let met = requirement::rule_satisfied(
                    &challenge.zone_id,
                    challenge.required_count,
                    &self.zones,
                    active,
                );
                if met {
                    challenge.status = ChallengeStatus::Success;
                    self.scheduler.cancel(TimerKind::ChallengeExpiry);
                    self.archive(ChallengeOutcome::from_challenge(&challenge, now));
                    events.push(Event::ChallengeSucceeded {
                        challenge_id: challenge.id.clone(),
                        at: now,
                    });
                    // Immediately line up the next one.
                    events.extend(self.schedule_next(policy, active.len(), now));
                } else if fired_expiry || now >= challenge.expires_at {
                    challenge.status = ChallengeStatus::Failed;
                    self.scheduler.cancel(TimerKind::ChallengeExpiry);
                    self.archive(ChallengeOutcome::from_challenge(&challenge, now));
                    self.failed_latch = true;
                    events.push(Event::ChallengeFailed {
                        challenge_id: challenge.id.clone(),
                        at: now,
                    });
                    self.active_challenge = Some(challenge);
                    // Failure forces Red over everything else.
                    events.extend(self.transition(GovernancePhase::Red, now));
                    return events;
                } else {
                    self.active_challenge = Some(challenge);
                }
            } else {
                self.active_challenge = Some(challenge);
            }
            return events;
        }

        if fired_next {
            // Re-validate against current state before acting: the
            // preview must still match the selected policy.
            let preview = self.next_challenge.take();
            let relevant = preview.as_ref().is_some_and(|p| p.policy_id == policy.id);
            if relevant {
                events.extend(self.activate_challenge(policy, active.len(), now));
            }
            return events;
        }

        if self.next_challenge.is_none() {
            events.extend(self.schedule_next(policy, active.len(), now));
        }
        events
    }

    /// Schedule the next-challenge preview for the policy's first
    /// challenge config. A config with no selections, or a headcount
    /// below the config's own minimum, disables scheduling silently.
    fn schedule_next(
        &mut self,
        policy: &GovernancePolicy,
        active_count: usize,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let Some(config) = policy.challenges.first() else {
            return Vec::new();
        };
        if config.selections.is_empty() || active_count < config.min_participants as usize {
            return Vec::new();
        }
        let [min, max] = config.interval_range_seconds;
        let delay = if min == max { min } else { self.rng.gen_range(min..=max) };
        let fires_at = now + Duration::seconds(delay as i64);
        self.scheduler.arm(TimerKind::NextChallenge, fires_at);
        self.next_challenge = Some(NextChallengePreview {
            policy_id: policy.id.clone(),
            config_id: config.id.clone(),
            fires_at,
        });
        vec![Event::ChallengeScheduled {
            challenge_id: config.id.clone(),
            fires_at,
            at: now,
        }]
    }

    fn activate_challenge(
        &mut self,
        policy: &GovernancePolicy,
        active_count: usize,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let Some(config) = policy.challenges.first() else {
            return Vec::new();
        };
        if active_count < config.min_participants as usize {
            return Vec::new();
        }
        // Prefer selections achievable with the current headcount;
        // fall back to the unfiltered list.
        let mut candidates: Vec<usize> = (0..config.selections.len())
            .filter(|&i| config.selections[i].rule.required_count(active_count) <= active_count)
            .collect();
        if candidates.is_empty() {
            candidates = (0..config.selections.len()).collect();
        }
        let state = self.selection_states.entry(config.id.clone()).or_default();
        let Some(index) = state.pick(config, &candidates, &mut self.rng) else {
            return Vec::new();
        };
        let selection = &config.selections[index];

        let required_count = selection.rule.required_count(active_count);
        let challenge = ActiveChallenge::new(
            &policy.id,
            &selection.zone,
            selection.rule,
            required_count,
            selection.time_limit_seconds,
            now,
        );
        self.scheduler.arm(TimerKind::ChallengeExpiry, challenge.expires_at);
        let event = Event::ChallengeStarted {
            challenge_id: challenge.id.clone(),
            zone_id: challenge.zone_id.clone(),
            required_count,
            expires_at: challenge.expires_at,
            at: now,
        };
        self.active_challenge = Some(challenge);
        vec![event]
    }

    fn archive(&mut self, outcome: ChallengeOutcome) {
        self.history.push_back(outcome);
        while self.history.len() > CHALLENGE_HISTORY_LIMIT {
            self.history.pop_front();
        }
    }
}
