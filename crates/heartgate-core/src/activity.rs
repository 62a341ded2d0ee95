//! Activity Monitor.
//!
//! Turns raw sample arrival times into a per-participant active flag.
//! A sample marks its participant active immediately; a fixed-period
//! sweep applies two independent thresholds: after `inactive_after_ms`
//! of silence the flag flips to false (state kept), after
//! `remove_after_ms` the record is deleted outright.
//!
//! The monitor also records an activity mask aligned to the timeline
//! tick grid. Mask history outlives record removal so reconstruction
//! can still classify old dropouts.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::ActivityConfig;
use crate::events::Event;

#[derive(Debug, Clone)]
struct ActivityRecord {
    last_seen: DateTime<Utc>,
    active: bool,
}

/// Per-participant liveness tracking.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    config: ActivityConfig,
    records: HashMap<String, ActivityRecord>,
    /// Tick-indexed active flags, padded with `false` for ticks before
    /// a participant's first sample.
    masks: HashMap<String, Vec<bool>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl ActivityMonitor {
    pub fn new(config: ActivityConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            masks: HashMap::new(),
            last_sweep: None,
        }
    }

    /// A sample arrived for `participant_id`: mark active immediately.
    pub fn record_sample(&mut self, participant_id: &str, at: DateTime<Utc>) -> Option<Event> {
        let record = self
            .records
            .entry(participant_id.to_string())
            .or_insert(ActivityRecord {
                last_seen: at,
                active: false,
            });
        let was_active = record.active;
        record.last_seen = at;
        record.active = true;
        (!was_active).then(|| Event::ParticipantActive {
            participant_id: participant_id.to_string(),
            at,
        })
    }

    pub fn is_active(&self, participant_id: &str) -> bool {
        self.records
            .get(participant_id)
            .map(|r| r.active)
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.active).count()
    }

    /// Run the sweep if the period has elapsed since the last one.
    pub fn maybe_sweep(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let period = Duration::milliseconds(self.config.sweep_period_ms as i64);
        match self.last_sweep {
            Some(last) if now - last < period => Vec::new(),
            _ => {
                self.last_sweep = Some(now);
                self.sweep(now)
            }
        }
    }

    /// Apply both silence thresholds against `now`.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let inactive_after = Duration::milliseconds(self.config.inactive_after_ms as i64);
        let remove_after = Duration::milliseconds(self.config.remove_after_ms as i64);
        let mut events = Vec::new();

        self.records.retain(|id, record| {
            let silence = now - record.last_seen;
            if silence >= remove_after {
                log::debug!("activity: removing {id} after {}ms silence", silence.num_milliseconds());
                events.push(Event::ParticipantRemoved {
                    participant_id: id.clone(),
                    at: now,
                });
                return false;
            }
            if silence >= inactive_after && record.active {
                record.active = false;
                events.push(Event::ParticipantInactive {
                    participant_id: id.clone(),
                    at: now,
                });
            }
            true
        });
        events
    }

    /// Append the current active flag of every known participant to the
    /// tick grid. `tick` is the index being recorded; participants that
    /// joined late are back-filled with `false`.
    pub fn record_tick(&mut self, tick: usize) {
        for (id, record) in &self.records {
            let mask = self.masks.entry(id.clone()).or_default();
            if mask.len() < tick {
                mask.resize(tick, false);
            }
            if mask.len() == tick {
                mask.push(record.active);
            }
        }
    }

    /// Activity mask aligned to the tick grid, `upto_tick` entries long.
    /// Unknown ids yield an empty mask, never an error.
    pub fn activity_mask(&self, participant_id: &str, upto_tick: usize) -> Vec<bool> {
        match self.masks.get(participant_id) {
            None => Vec::new(),
            Some(mask) => {
                let mut out = mask.clone();
                out.resize(upto_tick, false);
                out
            }
        }
    }

    /// Re-key a participant's liveness state and mask history (guest
    /// takeover). No-op for unknown ids.
    pub fn rename(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        if let Some(record) = self.records.remove(old) {
            self.records.insert(new.to_string(), record);
        }
        if let Some(mask) = self.masks.remove(old) {
            self.masks.insert(new.to_string(), mask);
        }
    }

    /// Drop all per-participant state (session teardown).
    pub fn clear(&mut self) {
        self.records.clear();
        self.masks.clear();
        self.last_sweep = None;
    }
}
