//! Base-requirement evaluation and policy selection.
//!
//! A policy's base requirement maps zone ids to headcount rules. A
//! participant counts toward a zone entry when their current zone rank
//! is at or above the required zone's rank, so overshooting a target
//! still satisfies it.

use serde::{Deserialize, Serialize};

use crate::config::{GovernancePolicy, RequirementRule};
use crate::roster::Participant;
use crate::zone::ZoneSet;

/// Evaluation result for one base-requirement entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementStatus {
    pub zone_id: String,
    pub rule: RequirementRule,
    pub required_count: usize,
    pub satisfied_count: usize,
    pub satisfied: bool,
}

/// A participant's zone rank: the roster's `zone_id` when the
/// collaborator resolved it, otherwise derived from their heart rate.
fn participant_rank(p: &Participant, zones: &ZoneSet) -> Option<usize> {
    match p.zone_id.as_deref() {
        Some(id) => zones.rank(id),
        None => p
            .heart_rate
            .and_then(|bpm| zones.zone_for_heart_rate(bpm))
            .and_then(|z| zones.rank(&z.id)),
    }
}

/// Count how many of `active` are at or above the zone with `min_rank`.
fn count_at_or_above(active: &[&Participant], zones: &ZoneSet, min_rank: usize) -> usize {
    active
        .iter()
        .filter(|p| participant_rank(p, zones).is_some_and(|rank| rank >= min_rank))
        .count()
}

/// Evaluate every entry of `policy`'s base requirement against the
/// active participants. Zones unknown to the configured set never
/// satisfy (rank lookup fails), they do not error.
pub fn evaluate_requirements(
    policy: &GovernancePolicy,
    zones: &ZoneSet,
    active: &[&Participant],
) -> Vec<RequirementStatus> {
    policy
        .base_requirement
        .iter()
        .map(|(zone_id, rule)| {
            let required_count = rule.required_count(active.len());
            let satisfied_count = zones
                .rank(zone_id)
                .map(|rank| count_at_or_above(active, zones, rank))
                .unwrap_or(0);
            RequirementStatus {
                zone_id: zone_id.clone(),
                rule: *rule,
                required_count,
                satisfied_count,
                satisfied: satisfied_count >= required_count,
            }
        })
        .collect()
}

/// Check a single zone/rule pair (used by challenges).
pub fn rule_satisfied(
    zone_id: &str,
    required_count: usize,
    zones: &ZoneSet,
    active: &[&Participant],
) -> bool {
    zones
        .rank(zone_id)
        .map(|rank| count_at_or_above(active, zones, rank))
        .unwrap_or(0)
        >= required_count
}

/// Pick the policy with the highest `min_participants` at or below the
/// active count; when none qualify, fall back to the lowest-threshold
/// policy. Empty policy list means governance never engages.
pub fn select_policy(policies: &[GovernancePolicy], active_count: usize) -> Option<&GovernancePolicy> {
    policies
        .iter()
        .filter(|p| (p.min_participants as usize) <= active_count)
        .max_by_key(|p| p.min_participants)
        .or_else(|| policies.iter().min_by_key(|p| p.min_participants))
}
