//! Session lifecycle and ingestion entry points.
//!
//! One [`Session`] exists per active workout. It owns every engine
//! (activity monitor, treasure box, governance, series store) and is
//! passed explicitly to all callers; there is no module-level state.
//! The caller drives it from two directions: `ingest_sample` whenever
//! a sensor reading arrives, and `tick` on a fixed cadence with the
//! current roster snapshot.
//!
//! The ingestion path never propagates errors: a malformed sample is
//! logged and dropped so the next one still lands.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::activity::ActivityMonitor;
use crate::config::{ChallengeSelection, SessionConfig};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::governance::{GovernanceEngine, GovernanceState};
use crate::roster::{MediaDescriptor, Participant, SensorSample};
use crate::timeline::{
    map_segments, polish_segments, reconstruct, ChartPath, MappingConfig, ReconstructInput,
    SeriesRow, SeriesStore,
};
use crate::treasure::{RewardSummary, TreasureBox};
use crate::zone::ZoneSet;

/// Sample profile that feeds reward accrual.
const HEART_RATE_PROFILE: &str = "heart_rate";

/// Session-scoped engine container with an explicit start/stop
/// lifecycle.
pub struct Session {
    id: String,
    config: SessionConfig,
    zones: ZoneSet,
    activity: ActivityMonitor,
    treasure: TreasureBox,
    governance: GovernanceEngine,
    series: SeriesStore,
    device_to_user: HashMap<String, String>,
    running: bool,
    events: Vec<Event>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_seed(config, None)
    }

    /// Like [`Session::new`] with a fixed RNG seed for reproducible
    /// challenge selection.
    pub fn with_seed(config: SessionConfig, seed: Option<u64>) -> Result<Self> {
        let zones = config.zone_set().map_err(CoreError::Config)?;
        let mut treasure = TreasureBox::new();
        treasure.configure(config.coin_time_unit_ms, zones.clone(), &config.users);
        let governance = GovernanceEngine::new(
            config.policies.clone(),
            config.governed_labels.clone(),
            config.grace_period_secs,
            zones.clone(),
            seed,
        );
        let device_to_user = config
            .users
            .iter()
            .filter_map(|u| u.device_id.clone().map(|d| (d, u.name.clone())))
            .collect();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            activity: ActivityMonitor::new(config.activity.clone()),
            treasure,
            governance,
            series: SeriesStore::new(),
            device_to_user,
            zones,
            config,
            running: false,
            events: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.running {
            return;
        }
        self.running = true;
        log::info!("session {} started", self.id);
        self.events.push(Event::SessionStarted {
            session_id: self.id.clone(),
            at: now,
        });
    }

    /// Tear the session down: every timer is cancelled and all
    /// per-user state released, so repeated start/stop cycles never
    /// leak.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if !self.running {
            return;
        }
        self.running = false;
        self.governance.reset();
        self.treasure.reset();
        self.activity.clear();
        self.series.clear();
        log::info!("session {} stopped", self.id);
        self.events.push(Event::SessionStopped {
            session_id: self.id.clone(),
            at: now,
        });
    }

    /// Re-apply configuration mid-session (e.g. a zone-profile
    /// change). Accrued totals are preserved.
    pub fn reconfigure(&mut self, config: SessionConfig) -> Result<()> {
        let zones = config.zone_set().map_err(CoreError::Config)?;
        self.treasure
            .configure(config.coin_time_unit_ms, zones.clone(), &config.users);
        self.governance.set_zones(zones.clone());
        for user in &config.users {
            if let Some(device) = &user.device_id {
                self.device_to_user.insert(device.clone(), user.name.clone());
            }
        }
        self.zones = zones;
        self.config = config;
        Ok(())
    }

    pub fn set_media(&mut self, media: Option<MediaDescriptor>, now: DateTime<Utc>) {
        let events = self.governance.set_media(media, now);
        self.events.extend(events);
    }

    /// Ingest one sensor sample. Never fails: unknown devices, bogus
    /// values and unparsable timestamps are logged and skipped so one
    /// malformed sample cannot block the ones behind it.
    pub fn ingest_sample(&mut self, sample: &SensorSample, now: DateTime<Utc>) {
        if !self.running {
            return;
        }
        let Some(user) = self.device_to_user.get(&sample.device_id).cloned() else {
            log::debug!("sample from unassigned device {}", sample.device_id);
            return;
        };
        if !sample.value.is_finite() || sample.value <= 0.0 {
            log::warn!(
                "dropping sample from {}: bad value {}",
                sample.device_id,
                sample.value
            );
            return;
        }
        let at = Utc
            .timestamp_millis_opt(sample.timestamp as i64)
            .single()
            .unwrap_or(now);

        if let Some(event) = self.activity.record_sample(&user, at) {
            self.events.push(event);
        }
        if sample.profile == HEART_RATE_PROFILE {
            let heart_rate = sample.value.round().clamp(0.0, u32::MAX as f64) as u32;
            if let Some(event) = self.treasure.record_user_heart_rate(&user, heart_rate, at) {
                self.events.push(event);
            }
        }
    }

    /// The periodic evaluation: liveness sweep, governance evaluation
    /// and one row of series history per roster participant.
    pub fn tick(&mut self, roster: &[Participant], now: DateTime<Utc>) {
        if !self.running {
            return;
        }
        let sweep_events = self.activity.maybe_sweep(now);
        self.events.extend(sweep_events);

        let governance_events = self.governance.evaluate(roster, now);
        self.events.extend(governance_events);

        let tick = self.series.len();
        self.activity.record_tick(tick);
        let rows: Vec<(String, SeriesRow)> = roster
            .iter()
            .filter_map(|p| {
                let reward = self.treasure.user(&p.name)?;
                Some((
                    p.name.clone(),
                    SeriesRow {
                        heart_rate: p.heart_rate.map(f64::from),
                        zone_id: reward.current_zone_id.clone(),
                        coins: Some(reward.total_coins as f64),
                    },
                ))
            })
            .collect();
        self.series
            .append_tick(rows.iter().map(|(id, row)| (id.as_str(), row.clone())));
    }

    /// Transfer a guest's running state to a new name (device
    /// takeover): rewards, liveness and recorded history all move.
    pub fn rename_user(&mut self, old: &str, new: &str) {
        self.treasure.rename_user(old, new);
        self.activity.rename(old, new);
        self.series.rename(old, new);
        for user in self.device_to_user.values_mut() {
            if user == old {
                *user = new.to_string();
            }
        }
    }

    pub fn trigger_challenge_now(
        &mut self,
        payload: Option<ChallengeSelection>,
        now: DateTime<Utc>,
    ) {
        let events = self.governance.trigger_challenge_now(payload, now);
        self.events.extend(events);
    }

    pub fn clear_failed_challenge(&mut self) {
        self.governance.clear_failed_challenge();
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn governance_state(&self, now: DateTime<Utc>) -> GovernanceState {
        self.governance.state(now)
    }

    pub fn reward_summary(&self) -> RewardSummary {
        self.treasure.summary()
    }

    pub fn treasure(&self) -> &TreasureBox {
        &self.treasure
    }

    pub fn activity(&self) -> &ActivityMonitor {
        &self.activity
    }

    pub fn series(&self) -> &SeriesStore {
        &self.series
    }

    /// Reconstruct one participant's render-ready chart paths.
    pub fn chart(&self, participant: &str, mapping: &MappingConfig) -> Vec<ChartPath> {
        let series = self.series.series(participant);
        let mask = self.activity.activity_mask(participant, self.series.len());
        let input = ReconstructInput {
            values: &series.coins,
            zone_ids: &series.zone_ids,
            mask: &mask,
            currently_active: self.activity.is_active(participant),
            now_tick: self.series.len().saturating_sub(1),
        };
        let mut segments = reconstruct(&input, &self.zones);
        polish_segments(
            &mut segments,
            &self.zones,
            self.config.tick_interval_ms,
            self.config.coin_time_unit_ms,
        );
        map_segments(&segments, mapping)
    }

    /// Drain the accumulated events (the UI polls these).
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
