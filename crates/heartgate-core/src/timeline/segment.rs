//! Chart segment model and coordinate mapping.
//!
//! A reconstructed timeline is an ordered list of segments, each a
//! polyline over `(tick, value)` points. Colored segments carry real
//! progress; gap segments are always perfectly flat and rendered
//! muted. Mapping turns segments into normalized path data for the
//! renderer, with a minimum visible tick span and optional logarithmic
//! y-compression.

use serde::{Deserialize, Serialize};

/// How the ticks under a segment were classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    /// Live data from an active participant.
    Active,
    /// Values were recorded but the participant was inactive (dropout).
    Idle,
    /// No values were recorded at all.
    Absent,
}

/// One polyline of the reconstructed chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSegment {
    /// Zone id coloring this segment (`None` for gaps before any zone).
    pub zone_id: Option<String>,
    pub color: Option<String>,
    pub status: SegmentStatus,
    pub is_gap: bool,
    /// Strictly increasing ticks.
    pub points: Vec<(usize, f64)>,
}

impl ChartSegment {
    pub fn first_value(&self) -> Option<f64> {
        self.points.first().map(|(_, v)| *v)
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|(_, v)| *v)
    }

    pub fn last_tick(&self) -> Option<usize> {
        self.points.last().map(|(t, _)| *t)
    }

    /// True when every point carries the same value.
    pub fn is_flat(&self) -> bool {
        match self.points.split_first() {
            Some(((_, first), rest)) => rest.iter().all(|(_, v)| (v - first).abs() < f64::EPSILON),
            None => true,
        }
    }

    /// Shift every value by `delta` (seam re-alignment).
    pub fn shift_values(&mut self, delta: f64) {
        if delta != 0.0 {
            for (_, value) in &mut self.points {
                *value += delta;
            }
        }
    }
}

/// Options for the tick/value -> screen-space projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// The x axis always spans at least this many ticks, so short
    /// sessions do not stretch across the full chart width.
    pub min_visible_ticks: usize,
    /// Optional logarithmic y-compression.
    #[serde(default)]
    pub log_compression: bool,
    /// Fraction of headroom above the highest value (0.0-1.0).
    #[serde(default)]
    pub margin_top: f64,
    /// Fraction of floor below the lowest value (0.0-1.0).
    #[serde(default)]
    pub margin_bottom: f64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            min_visible_ticks: 60,
            log_compression: false,
            margin_top: 0.05,
            margin_bottom: 0.0,
        }
    }
}

/// A render-ready path: normalized `(x, y)` pairs in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPath {
    pub zone_id: Option<String>,
    pub color: Option<String>,
    pub status: SegmentStatus,
    pub opacity: f64,
    pub is_gap: bool,
    pub path_data: Vec<(f64, f64)>,
}

fn compress(value: f64, log_compression: bool) -> f64 {
    if log_compression {
        (value.max(0.0) + 1.0).ln()
    } else {
        value
    }
}

/// Project segments to normalized chart coordinates.
pub fn map_segments(segments: &[ChartSegment], config: &MappingConfig) -> Vec<ChartPath> {
    let max_tick = segments
        .iter()
        .filter_map(ChartSegment::last_tick)
        .max()
        .unwrap_or(0);
    let span = max_tick.max(config.min_visible_ticks.saturating_sub(1)).max(1) as f64;

    let values: Vec<f64> = segments
        .iter()
        .flat_map(|s| s.points.iter().map(|(_, v)| compress(*v, config.log_compression)))
        .collect();
    let low = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let high = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let (low, high) = if values.is_empty() { (0.0, 1.0) } else { (low, high) };
    let padded_low = low - (high - low).max(1.0) * config.margin_bottom;
    let padded_high = high + (high - low).max(1.0) * config.margin_top;
    let y_span = (padded_high - padded_low).max(f64::MIN_POSITIVE);

    segments
        .iter()
        .map(|segment| ChartPath {
            zone_id: segment.zone_id.clone(),
            color: segment.color.clone(),
            status: segment.status,
            opacity: if segment.is_gap { 0.35 } else { 1.0 },
            is_gap: segment.is_gap,
            path_data: segment
                .points
                .iter()
                .map(|(tick, value)| {
                    let x = *tick as f64 / span;
                    let y = (compress(*value, config.log_compression) - padded_low) / y_span;
                    (x, y)
                })
                .collect(),
        })
        .collect()
}
