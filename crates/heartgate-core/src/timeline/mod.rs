//! Timeline reconstruction.
//!
//! The [`SeriesStore`] is the append-only source of truth: one row per
//! participant per tick, recorded by the session loop. Reconstruction
//! is on-demand; nothing here runs continuously.

mod reconstruct;
mod segment;

pub use reconstruct::{polish_segments, reconstruct, ReconstructInput};
pub use segment::{map_segments, ChartPath, ChartSegment, MappingConfig, SegmentStatus};

use std::collections::HashMap;

/// One participant's values at one tick.
#[derive(Debug, Clone, Default)]
pub struct SeriesRow {
    pub heart_rate: Option<f64>,
    pub zone_id: Option<String>,
    /// Cumulative committed coins.
    pub coins: Option<f64>,
}

/// A participant's full recorded history, padded to the grid length.
#[derive(Debug, Clone, Default)]
pub struct ParticipantSeries {
    pub heart_rate: Vec<Option<f64>>,
    pub zone_ids: Vec<Option<String>>,
    pub coins: Vec<Option<f64>>,
}

/// Named tick-indexed series for every participant.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    len: usize,
    heart_rate: HashMap<String, Vec<Option<f64>>>,
    zone_ids: HashMap<String, Vec<Option<String>>>,
    coins: HashMap<String, Vec<Option<f64>>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded ticks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record one tick. Participants missing from `rows` are padded
    /// with nulls on their next appearance (or at read time).
    pub fn append_tick<'a, I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, SeriesRow)>,
    {
        let tick = self.len;
        for (id, row) in rows {
            Self::push_at(self.heart_rate.entry(id.to_string()).or_default(), tick, row.heart_rate);
            Self::push_at(self.zone_ids.entry(id.to_string()).or_default(), tick, row.zone_id);
            Self::push_at(self.coins.entry(id.to_string()).or_default(), tick, row.coins);
        }
        self.len += 1;
        tick
    }

    fn push_at<T>(series: &mut Vec<Option<T>>, tick: usize, value: Option<T>) {
        if series.len() < tick {
            series.resize_with(tick, || None);
        }
        if series.len() == tick {
            series.push(value);
        }
    }

    /// A participant's history padded to the grid length. Unknown ids
    /// yield an all-null series of the grid length.
    pub fn series(&self, participant_id: &str) -> ParticipantSeries {
        let pad = |v: Option<&Vec<Option<f64>>>| {
            let mut out = v.cloned().unwrap_or_default();
            out.resize_with(self.len, || None);
            out
        };
        let mut zone_ids = self.zone_ids.get(participant_id).cloned().unwrap_or_default();
        zone_ids.resize_with(self.len, || None);
        ParticipantSeries {
            heart_rate: pad(self.heart_rate.get(participant_id)),
            zone_ids,
            coins: pad(self.coins.get(participant_id)),
        }
    }

    /// Re-key a participant's history (guest takeover).
    pub fn rename(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        if let Some(series) = self.heart_rate.remove(old) {
            self.heart_rate.insert(new.to_string(), series);
        }
        if let Some(series) = self.zone_ids.remove(old) {
            self.zone_ids.insert(new.to_string(), series);
        }
        if let Some(series) = self.coins.remove(old) {
            self.coins.insert(new.to_string(), series);
        }
    }

    /// Drop all recorded history (session teardown).
    pub fn clear(&mut self) {
        self.len = 0;
        self.heart_rate.clear();
        self.zone_ids.clear();
        self.coins.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(zone: &str, coins: f64) -> SeriesRow {
        SeriesRow {
            heart_rate: Some(120.0),
            zone_id: Some(zone.to_string()),
            coins: Some(coins),
        }
    }

    #[test]
    fn append_pads_missed_ticks_with_nulls() {
        let mut store = SeriesStore::new();
        store.append_tick([("ada", row("warm", 1.0))]);
        store.append_tick([] as [(&str, SeriesRow); 0]);
        store.append_tick([("ada", row("warm", 2.0))]);

        let series = store.series("ada");
        assert_eq!(series.coins, vec![Some(1.0), None, Some(2.0)]);
        assert_eq!(series.zone_ids[2].as_deref(), Some("warm"));
    }

    #[test]
    fn late_joiner_is_backfilled() {
        let mut store = SeriesStore::new();
        store.append_tick([("ada", row("warm", 1.0))]);
        store.append_tick([("ada", row("warm", 2.0)), ("bob", row("rest", 0.0))]);

        let series = store.series("bob");
        assert_eq!(series.coins, vec![None, Some(0.0)]);
    }

    #[test]
    fn unknown_participant_reads_all_null() {
        let mut store = SeriesStore::new();
        store.append_tick([("ada", row("warm", 1.0))]);
        let series = store.series("ghost");
        assert_eq!(series.coins, vec![None]);
        assert_eq!(series.heart_rate, vec![None]);
    }
}
