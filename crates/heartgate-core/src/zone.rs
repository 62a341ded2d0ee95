//! Heart-rate zones.
//!
//! A zone is a heart-rate band with a display color and a coin rate.
//! Zones are kept sorted ascending by their `min` threshold; a zone's
//! rank is its position in that order. Requirement checks compare
//! ranks, never raw bpm.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A single heart-rate band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub id: String,
    pub name: String,
    /// Display color, e.g. "#4caf50". Also the reward bucket key.
    pub color: String,
    /// Lower bpm bound (inclusive).
    #[serde(alias = "min_bpm")]
    pub min: u32,
    /// Coins earned per coin time unit spent in this zone.
    #[serde(default, alias = "coin_rate")]
    pub coins: u32,
}

/// An ordered set of zones for one session.
///
/// Construction sorts ascending by `min` and rejects duplicate
/// thresholds, so rank is strictly monotonic in `min`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSet {
    zones: Vec<ZoneDefinition>,
}

impl ZoneSet {
    /// Build a zone set, sorting by `min` and validating monotonicity.
    pub fn new(mut zones: Vec<ZoneDefinition>) -> Result<Self, ValidationError> {
        zones.sort_by_key(|z| z.min);
        for pair in zones.windows(2) {
            if pair[1].min <= pair[0].min {
                return Err(ValidationError::NonMonotonicZones {
                    zone: pair[1].id.clone(),
                    min: pair[1].min,
                    previous: pair[0].min,
                });
            }
        }
        Ok(Self { zones })
    }

    /// An empty set. Every lookup returns `None`; accrual is inert.
    pub fn empty() -> Self {
        Self { zones: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneDefinition> {
        self.zones.iter()
    }

    /// Rank of a zone id (sort position), or `None` for unknown ids.
    pub fn rank(&self, id: &str) -> Option<usize> {
        self.zones.iter().position(|z| z.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&ZoneDefinition> {
        self.zones.iter().find(|z| z.id == id)
    }

    /// Resolve the zone for a heart rate: the highest zone whose `min`
    /// is at or below `bpm` wins. Below the lowest threshold (or with
    /// no zones configured) there is no zone.
    pub fn zone_for_heart_rate(&self, bpm: u32) -> Option<&ZoneDefinition> {
        self.zones.iter().rev().find(|z| z.min <= bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: &str, min: u32, coins: u32) -> ZoneDefinition {
        ZoneDefinition {
            id: id.to_string(),
            name: id.to_uppercase(),
            color: format!("#{id}"),
            min,
            coins,
        }
    }

    #[test]
    fn ranks_follow_min_order_regardless_of_input_order() {
        let set = ZoneSet::new(vec![zone("hot", 150, 3), zone("rest", 0, 0), zone("warm", 110, 1)])
            .unwrap();
        assert_eq!(set.rank("rest"), Some(0));
        assert_eq!(set.rank("warm"), Some(1));
        assert_eq!(set.rank("hot"), Some(2));
        assert_eq!(set.rank("nope"), None);
    }

    #[test]
    fn duplicate_thresholds_rejected() {
        let result = ZoneSet::new(vec![zone("a", 100, 1), zone("b", 100, 2)]);
        assert!(result.is_err());
    }

    #[test]
    fn highest_matching_zone_wins() {
        let set = ZoneSet::new(vec![zone("rest", 0, 0), zone("warm", 110, 1), zone("hot", 150, 3)])
            .unwrap();
        assert_eq!(set.zone_for_heart_rate(109).unwrap().id, "rest");
        assert_eq!(set.zone_for_heart_rate(110).unwrap().id, "warm");
        assert_eq!(set.zone_for_heart_rate(200).unwrap().id, "hot");
    }

    #[test]
    fn below_lowest_threshold_is_none() {
        let set = ZoneSet::new(vec![zone("warm", 110, 1)]).unwrap();
        assert!(set.zone_for_heart_rate(80).is_none());
        assert!(ZoneSet::empty().zone_for_heart_rate(80).is_none());
    }
}
