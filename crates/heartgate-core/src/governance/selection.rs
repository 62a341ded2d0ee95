//! Challenge selection strategies.
//!
//! Candidates are indices into a `ChallengeConfig`'s selection list,
//! pre-filtered by the caller to those achievable with the current
//! headcount. Strategy state (cyclic cursor, shuffle bag) persists per
//! challenge config across draws.

use rand::prelude::*;

use crate::config::{ChallengeConfig, SelectionType};

/// Persistent per-config draw state.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    /// Wrapping cursor for `SelectionType::Cyclic`.
    cursor: usize,
    /// Remaining indices for `SelectionType::Random`; refilled with a
    /// fresh shuffle once exhausted.
    bag: Vec<usize>,
}

impl SelectionState {
    /// Draw the next selection index from `candidates`.
    /// Returns `None` only when `candidates` is empty.
    pub fn pick<R: Rng>(
        &mut self,
        config: &ChallengeConfig,
        candidates: &[usize],
        rng: &mut R,
    ) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        match config.selection_type {
            SelectionType::Cyclic => {
                let index = candidates[self.cursor % candidates.len()];
                self.cursor = self.cursor.wrapping_add(1);
                Some(index)
            }
            SelectionType::Random => {
                // Drop bag entries filtered out since the last refill.
                self.bag.retain(|i| candidates.contains(i));
                if self.bag.is_empty() {
                    self.bag = candidates.to_vec();
                    self.bag.shuffle(rng);
                }
                self.bag.pop()
            }
            SelectionType::Weighted => {
                let total: u64 = candidates
                    .iter()
                    .map(|&i| config.selections[i].weight.max(1) as u64)
                    .sum();
                let mut draw = rng.gen_range(0..total);
                for &i in candidates {
                    let weight = config.selections[i].weight.max(1) as u64;
                    if draw < weight {
                        return Some(i);
                    }
                    draw -= weight;
                }
                // Unreachable with exact integer weights; keep the
                // observed last-candidate fallback.
                candidates.last().copied()
            }
        }
    }
}
