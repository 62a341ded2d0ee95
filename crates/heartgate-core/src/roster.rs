//! Roster snapshots and collaborator-facing input types.
//!
//! The roster is rebuilt by an external collaborator every evaluation
//! tick; the engine treats it as a read-only snapshot and never stores
//! it between ticks.

use serde::{Deserialize, Serialize};

/// One recognized participant (primary user or assigned guest) with
/// their live vitals for this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "deviceId")]
    pub device_id: Option<String>,
    #[serde(default, alias = "heartRate")]
    pub heart_rate: Option<u32>,
    #[serde(default, alias = "isActive")]
    pub is_active: bool,
    #[serde(default, alias = "zoneId")]
    pub zone_id: Option<String>,
    #[serde(default, alias = "zoneColor")]
    pub zone_color: Option<String>,
    #[serde(default, alias = "isGuest")]
    pub is_guest: bool,
}

/// A raw sensor reading handed in by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    #[serde(alias = "deviceId")]
    pub device_id: String,
    /// Measurement profile, e.g. "heart_rate" or "cadence".
    pub profile: String,
    pub value: f64,
    /// Epoch milliseconds at capture time.
    pub timestamp: u64,
}

/// Descriptor of the media the player is currently showing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
}

impl MediaDescriptor {
    /// True when any label (or the media type) appears in `governed`.
    pub fn matches_any(&self, governed: &[String]) -> bool {
        self.labels.iter().any(|l| governed.contains(l))
            || self
                .media_type
                .as_ref()
                .is_some_and(|t| governed.contains(t))
    }
}
