//! Reward Accrual Engine ("TreasureBox").
//!
//! Coins accrue from time spent in a reward-earning heart-rate zone.
//! Each sample folds the wall-clock gap since the user's previous
//! sample into a running interval counter; every time the counter
//! crosses the coin time unit, whole units are committed at the zone's
//! coin rate and the remainder stays in the counter. Sampling may be
//! arbitrarily irregular: no time is lost and none is double-counted
//! across interval boundaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::UserConfig;
use crate::events::Event;
use crate::zone::ZoneSet;

/// Post-mutation listener. Invoked after every completed state write;
/// must tolerate redundant calls. It receives no engine reference, so
/// it cannot re-enter a mutating call.
pub type MutationCallback = Box<dyn FnMut()>;

/// Running accrual state for one user. Created lazily on first sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserReward {
    #[serde(default)]
    pub current_zone_id: Option<String>,
    /// Uncommitted milliseconds toward the next coin payout.
    pub interval_progress_ms: u64,
    pub total_coins: u64,
    /// Committed coins keyed by zone color.
    #[serde(default)]
    pub buckets: BTreeMap<String, u64>,
    #[serde(skip)]
    last_sample_at: Option<DateTime<Utc>>,
}

/// Aggregate view handed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSummary {
    pub total_coins: u64,
    pub buckets: BTreeMap<String, u64>,
    pub per_user: BTreeMap<String, UserReward>,
}

/// Zone-based coin accrual over irregular heart-rate samples.
pub struct TreasureBox {
    coin_time_unit_ms: u64,
    zones: ZoneSet,
    users: BTreeMap<String, UserReward>,
    on_mutate: Option<MutationCallback>,
}

impl std::fmt::Debug for TreasureBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreasureBox")
            .field("coin_time_unit_ms", &self.coin_time_unit_ms)
            .field("zones", &self.zones)
            .field("users", &self.users)
            .finish_non_exhaustive()
    }
}

impl Default for TreasureBox {
    fn default() -> Self {
        Self::new()
    }
}

impl TreasureBox {
    /// An unconfigured box: no zones, so every sample is a no-op.
    pub fn new() -> Self {
        Self {
            coin_time_unit_ms: 60_000,
            zones: ZoneSet::empty(),
            users: BTreeMap::new(),
            on_mutate: None,
        }
    }

    /// Apply (or re-apply) configuration. Idempotent: existing totals
    /// and interval counters are never touched, so a zone-profile
    /// change mid-session keeps everything accrued so far.
    pub fn configure(&mut self, coin_time_unit_ms: u64, zones: ZoneSet, users: &[UserConfig]) {
        self.coin_time_unit_ms = coin_time_unit_ms.max(1);
        self.zones = zones;
        // Known users get a record up front so the UI can list them at
        // zero coins; anyone else is created lazily on first sample.
        for user in users {
            self.users.entry(user.name.clone()).or_default();
        }
    }

    pub fn set_mutation_callback(&mut self, callback: MutationCallback) {
        self.on_mutate = Some(callback);
    }

    /// Ingest one heart-rate sample for `name` at time `at`.
    ///
    /// Returns a `CoinsCommitted` event when whole coin units were
    /// committed by this sample.
    pub fn record_user_heart_rate(
        &mut self,
        name: &str,
        heart_rate: u32,
        at: DateTime<Utc>,
    ) -> Option<Event> {
        if self.zones.is_empty() {
            return None;
        }
        let zone = self.zones.zone_for_heart_rate(heart_rate)?.clone();
        let unit = self.coin_time_unit_ms;

        let record = self.users.entry(name.to_string()).or_default();
        let elapsed_ms = record
            .last_sample_at
            .map(|last| (at - last).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        record.last_sample_at = Some(at);
        record.current_zone_id = Some(zone.id.clone());

        record.interval_progress_ms += elapsed_ms;
        let units = record.interval_progress_ms / unit;
        record.interval_progress_ms %= unit;

        let coins = units * zone.coins as u64;
        let mut event = None;
        if coins > 0 {
            record.total_coins += coins;
            *record.buckets.entry(zone.color.clone()).or_insert(0) += coins;
            event = Some(Event::CoinsCommitted {
                user: name.to_string(),
                zone_id: zone.id.clone(),
                coins,
                total_coins: record.total_coins,
                at,
            });
        }
        self.notify_mutation();
        event
    }

    /// Projected total including the uncommitted interval fraction.
    /// Read-only: committed state is never touched.
    pub fn interval_progress(&self, name: &str) -> f64 {
        let Some(record) = self.users.get(name) else {
            return 0.0;
        };
        let rate = record
            .current_zone_id
            .as_deref()
            .and_then(|id| self.zones.get(id))
            .map(|z| z.coins)
            .unwrap_or(0);
        let fraction = record.interval_progress_ms as f64 / self.coin_time_unit_ms as f64;
        record.total_coins as f64 + fraction * rate as f64
    }

    /// Atomically transfer all running state from `old` to `new`; the
    /// old key ceases to exist. Used when a guest takes over a device.
    pub fn rename_user(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        if let Some(record) = self.users.remove(old) {
            self.users.insert(new.to_string(), record);
            self.notify_mutation();
        }
    }

    pub fn user(&self, name: &str) -> Option<&UserReward> {
        self.users.get(name)
    }

    pub fn summary(&self) -> RewardSummary {
        let mut total_coins = 0;
        let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
        for record in self.users.values() {
            total_coins += record.total_coins;
            for (color, coins) in &record.buckets {
                *buckets.entry(color.clone()).or_insert(0) += coins;
            }
        }
        RewardSummary {
            total_coins,
            buckets,
            per_user: self.users.clone(),
        }
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    /// Current zone id for a user, if they have sampled yet.
    pub fn current_zone(&self, name: &str) -> Option<&str> {
        self.users.get(name)?.current_zone_id.as_deref()
    }

    /// Drop all per-user state (session teardown).
    pub fn reset(&mut self) {
        self.users.clear();
        self.notify_mutation();
    }

    fn notify_mutation(&mut self) {
        if let Some(callback) = self.on_mutate.as_mut() {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneDefinition;
    use chrono::Duration;
    use std::cell::Cell;
    use std::rc::Rc;

    fn zones() -> ZoneSet {
        ZoneSet::new(vec![
            ZoneDefinition {
                id: "rest".into(),
                name: "Rest".into(),
                color: "#9e9e9e".into(),
                min: 0,
                coins: 0,
            },
            ZoneDefinition {
                id: "warm".into(),
                name: "Warm Up".into(),
                color: "#4caf50".into(),
                min: 110,
                coins: 2,
            },
            ZoneDefinition {
                id: "hot".into(),
                name: "Push".into(),
                color: "#f44336".into(),
                min: 150,
                coins: 5,
            },
        ])
        .unwrap()
    }

    fn configured() -> TreasureBox {
        let mut treasure = TreasureBox::new();
        treasure.configure(10_000, zones(), &[]);
        treasure
    }

    #[test]
    fn whole_units_commit_remainder_carries() {
        let mut treasure = configured();
        let start = Utc::now();
        treasure.record_user_heart_rate("ada", 120, start);
        // 25s in the warm zone = 2 whole 10s units, 5s remainder.
        let event = treasure.record_user_heart_rate("ada", 120, start + Duration::seconds(25));
        assert!(matches!(event, Some(Event::CoinsCommitted { coins: 4, .. })));
        let record = treasure.user("ada").unwrap();
        assert_eq!(record.total_coins, 4);
        assert_eq!(record.interval_progress_ms, 5_000);
        // 5s more completes the third unit exactly, nothing carried.
        treasure.record_user_heart_rate("ada", 120, start + Duration::seconds(30));
        let record = treasure.user("ada").unwrap();
        assert_eq!(record.total_coins, 6);
        assert_eq!(record.interval_progress_ms, 0);
    }

    #[test]
    fn irregular_sampling_is_exact() {
        let mut treasure = configured();
        let start = Utc::now();
        let mut at = start;
        treasure.record_user_heart_rate("ada", 120, at);
        for step_ms in [300, 7_700, 1, 14_999, 9_000, 3_000, 25_000] {
            at += Duration::milliseconds(step_ms);
            treasure.record_user_heart_rate("ada", 120, at);
        }
        let total_ms: u64 = 300 + 7_700 + 1 + 14_999 + 9_000 + 3_000 + 25_000;
        let record = treasure.user("ada").unwrap();
        assert_eq!(record.total_coins, (total_ms / 10_000) * 2);
        assert_eq!(record.interval_progress_ms, total_ms % 10_000);
    }

    #[test]
    fn zero_rate_zone_accrues_nothing() {
        let mut treasure = configured();
        let start = Utc::now();
        treasure.record_user_heart_rate("ada", 80, start);
        let event = treasure.record_user_heart_rate("ada", 80, start + Duration::seconds(45));
        assert!(event.is_none());
        assert_eq!(treasure.user("ada").unwrap().total_coins, 0);
        // The counter still rolls over so a later zone switch is clean.
        assert_eq!(treasure.user("ada").unwrap().interval_progress_ms, 5_000);
    }

    #[test]
    fn unconfigured_box_is_inert() {
        let mut treasure = TreasureBox::new();
        assert!(treasure.record_user_heart_rate("ada", 150, Utc::now()).is_none());
        assert!(treasure.user("ada").is_none());
    }

    #[test]
    fn configure_is_idempotent() {
        let mut treasure = configured();
        let start = Utc::now();
        treasure.record_user_heart_rate("ada", 120, start);
        treasure.record_user_heart_rate("ada", 120, start + Duration::seconds(25));
        let before = treasure.user("ada").unwrap().clone();

        treasure.configure(10_000, zones(), &[]);
        let after = treasure.user("ada").unwrap();
        assert_eq!(after.total_coins, before.total_coins);
        assert_eq!(after.interval_progress_ms, before.interval_progress_ms);
    }

    #[test]
    fn interval_progress_projects_without_mutating() {
        let mut treasure = configured();
        let start = Utc::now();
        treasure.record_user_heart_rate("ada", 120, start);
        treasure.record_user_heart_rate("ada", 120, start + Duration::seconds(15));
        // 1 unit committed (2 coins), 5s of a 10s unit pending at rate 2.
        let projected = treasure.interval_progress("ada");
        assert!((projected - 3.0).abs() < 1e-9);
        assert_eq!(treasure.user("ada").unwrap().total_coins, 2);
        assert_eq!(treasure.user("ada").unwrap().interval_progress_ms, 5_000);
    }

    #[test]
    fn rename_moves_state_exactly() {
        let mut treasure = configured();
        let start = Utc::now();
        treasure.record_user_heart_rate("guest-3", 160, start);
        treasure.record_user_heart_rate("guest-3", 160, start + Duration::seconds(240));
        assert_eq!(treasure.user("guest-3").unwrap().total_coins, 120);

        treasure.rename_user("guest-3", "ada");
        assert!(treasure.user("guest-3").is_none());
        assert_eq!(treasure.user("ada").unwrap().total_coins, 120);
    }

    #[test]
    fn mutation_callback_fires_after_commit() {
        let mut treasure = configured();
        let calls = Rc::new(Cell::new(0u32));
        let seen = calls.clone();
        treasure.set_mutation_callback(Box::new(move || seen.set(seen.get() + 1)));

        let start = Utc::now();
        treasure.record_user_heart_rate("ada", 120, start);
        treasure.record_user_heart_rate("ada", 120, start + Duration::seconds(25));
        assert_eq!(calls.get(), 2);
        treasure.rename_user("ada", "bea");
        assert_eq!(calls.get(), 3);
        // Renaming a missing key mutates nothing and stays silent.
        treasure.rename_user("ghost", "casper");
        assert_eq!(calls.get(), 3);
    }
}
