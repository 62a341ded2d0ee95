//! Dropout-aware chart reconstruction.
//!
//! Rebuilds a participant's reward line from tick-indexed series,
//! splitting it into colored progress segments and flat gap segments.
//! Classification keys off the recorded activity mask: a tick with no
//! value is Absent, a tick with a value but mask=false is Idle, and
//! both extend a pending gap anchored at the last known point. A gap
//! is always horizontal; any value jump at rejoin belongs to the next
//! colored segment.
//!
//! `reconstruct` produces raw topology; `polish_segments` applies the
//! rate-aware cleanup pass (zero-rate flattening, reinterpolation of
//! flat nonzero-rate segments, seam re-alignment).

use crate::zone::ZoneSet;

use super::segment::{ChartSegment, SegmentStatus};

/// Per-participant input series, one entry per tick.
#[derive(Debug, Clone, Default)]
pub struct ReconstructInput<'a> {
    /// Cumulative reward values (the charted series).
    pub values: &'a [Option<f64>],
    /// Zone id per tick, for segment coloring.
    pub zone_ids: &'a [Option<String>],
    /// Activity mask, the single source of truth for dropout
    /// classification. Shorter masks are padded with `false`.
    pub mask: &'a [bool],
    /// External live state: the participant is active right now even
    /// if recorded data has not caught up.
    pub currently_active: bool,
    /// The current tick ("now") on the shared grid.
    pub now_tick: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickClass {
    Absent,
    Idle,
    Active,
}

fn classify(value: Option<f64>, active: bool) -> TickClass {
    match (value, active) {
        (None, _) => TickClass::Absent,
        (Some(_), false) => TickClass::Idle,
        (Some(_), true) => TickClass::Active,
    }
}

struct PendingGap {
    anchor_tick: usize,
    anchor_value: f64,
    zone_id: Option<String>,
    saw_idle: bool,
}

impl PendingGap {
    fn into_segment(self, end_tick: usize, zones: &ZoneSet) -> Option<ChartSegment> {
        if end_tick <= self.anchor_tick {
            return None;
        }
        Some(ChartSegment {
            color: self
                .zone_id
                .as_deref()
                .and_then(|id| zones.get(id))
                .map(|z| z.color.clone()),
            zone_id: self.zone_id,
            status: if self.saw_idle { SegmentStatus::Idle } else { SegmentStatus::Absent },
            is_gap: true,
            points: vec![
                (self.anchor_tick, self.anchor_value),
                (end_tick, self.anchor_value),
            ],
        })
    }
}

fn colored(zone_id: Option<String>, points: Vec<(usize, f64)>, zones: &ZoneSet) -> ChartSegment {
    ChartSegment {
        color: zone_id.as_deref().and_then(|id| zones.get(id)).map(|z| z.color.clone()),
        zone_id,
        status: SegmentStatus::Active,
        is_gap: false,
        points,
    }
}

/// Rebuild the ordered segment list for one participant.
/// An empty or fully-null series yields an empty result.
pub fn reconstruct(input: &ReconstructInput<'_>, zones: &ZoneSet) -> Vec<ChartSegment> {
    let len = input.values.len();
    let mut segments = Vec::new();
    let mut current: Option<(Option<String>, Vec<(usize, f64)>)> = None;
    let mut gap: Option<PendingGap> = None;
    let mut seen_active = false;

    for tick in 0..len {
        let value = input.values[tick];
        let active = input.mask.get(tick).copied().unwrap_or(false);
        let zone_id = input.zone_ids.get(tick).cloned().flatten();

        match classify(value, active) {
            TickClass::Active => {
                let value = value.unwrap_or(0.0);
                if !seen_active {
                    seen_active = true;
                    // Pre-join ticks become a synthetic origin anchor,
                    // never a gap: every line starts at value zero.
                    let mut points = Vec::new();
                    if tick > 0 {
                        points.push((0, 0.0));
                    }
                    points.push((tick, value));
                    current = Some((zone_id, points));
                } else if let Some(pending) = gap.take() {
                    // Exactly one flat segment to the rejoin tick; the
                    // jump to the new value starts the colored segment.
                    segments.extend(pending.into_segment(tick, zones));
                    current = Some((zone_id, vec![(tick, value)]));
                } else {
                    let zone_changed =
                        current.as_ref().is_some_and(|(zone, _)| *zone != zone_id);
                    if zone_changed {
                        // Close on a shared boundary point so no
                        // diagonal falls between segments.
                        if let Some((zone, mut points)) = current.take() {
                            points.push((tick, value));
                            segments.push(colored(zone, points, zones));
                        }
                        current = Some((zone_id, vec![(tick, value)]));
                    } else if let Some((_, points)) = current.as_mut() {
                        points.push((tick, value));
                    } else {
                        current = Some((zone_id, vec![(tick, value)]));
                    }
                }
            }
            class @ (TickClass::Absent | TickClass::Idle) => {
                if !seen_active {
                    continue;
                }
                match gap.as_mut() {
                    Some(pending) => pending.saw_idle |= class == TickClass::Idle,
                    None => {
                        if let Some((zone, points)) = current.take() {
                            if let Some(&(anchor_tick, anchor_value)) = points.last() {
                                gap = Some(PendingGap {
                                    anchor_tick,
                                    anchor_value,
                                    zone_id: zone.clone(),
                                    saw_idle: class == TickClass::Idle,
                                });
                            }
                            segments.push(colored(zone, points, zones));
                        }
                    }
                }
            }
        }
    }

    if let Some((zone, points)) = current.take() {
        segments.push(colored(zone, points, zones));
    }
    if let Some(pending) = gap.take() {
        // A series ending mid-gap still shows a muted line to the end
        // of the grid; a live participant extends it to "now".
        let end_tick = if input.currently_active {
            input.now_tick.max(len.saturating_sub(1))
        } else {
            len.saturating_sub(1)
        };
        segments.extend(pending.into_segment(end_tick, zones));
    }
    segments
}

/// Rate-aware cleanup pass over reconstructed segments.
///
/// Segments colored by a zero-rate zone are forced perfectly flat.
/// Segments in a nonzero-rate zone that were recorded flat (a sampling
/// artifact) are linearly reinterpolated at the zone's per-tick coin
/// rate. Each correction shifts every later segment by the same delta
/// so boundaries stay seamless.
pub fn polish_segments(
    segments: &mut [ChartSegment],
    zones: &ZoneSet,
    tick_interval_ms: u64,
    coin_time_unit_ms: u64,
) {
    let mut offset = 0.0;
    for segment in segments.iter_mut() {
        segment.shift_values(offset);
        if segment.is_gap {
            continue;
        }
        let rate = segment
            .zone_id
            .as_deref()
            .and_then(|id| zones.get(id))
            .map(|z| z.coins)
            .unwrap_or(0);
        let old_last = segment.last_value().unwrap_or(0.0);
        if rate == 0 {
            if let Some(first) = segment.first_value() {
                for (_, value) in &mut segment.points {
                    *value = first;
                }
            }
        } else if segment.is_flat() && segment.points.len() > 1 {
            let per_tick =
                rate as f64 * tick_interval_ms as f64 / coin_time_unit_ms.max(1) as f64;
            let (start_tick, start_value) = segment.points[0];
            for (tick, value) in &mut segment.points {
                *value = start_value + per_tick * (*tick - start_tick) as f64;
            }
        }
        offset += segment.last_value().unwrap_or(0.0) - old_last;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneDefinition;

    fn zones() -> ZoneSet {
        ZoneSet::new(vec![
            ZoneDefinition { id: "rest".into(), name: "Rest".into(), color: "#999".into(), min: 0, coins: 0 },
            ZoneDefinition { id: "warm".into(), name: "Warm".into(), color: "#4caf50".into(), min: 110, coins: 2 },
        ])
        .unwrap()
    }

    fn warm(n: usize) -> Vec<Option<String>> {
        vec![Some("warm".to_string()); n]
    }

    #[test]
    fn dropout_produces_one_flat_gap_and_a_resuming_segment() {
        let values = [Some(5.0), Some(5.0), Some(5.0), None, None, Some(8.0), Some(9.0)];
        let mask = [true, true, true, false, false, true, true];
        let input = ReconstructInput {
            values: &values,
            zone_ids: &warm(7),
            mask: &mask,
            currently_active: true,
            now_tick: 6,
        };
        let segments = reconstruct(&input, &zones());

        let gaps: Vec<_> = segments.iter().filter(|s| s.is_gap).collect();
        assert_eq!(gaps.len(), 1);
        // Flat gap anchored at 5, spanning to the rejoin tick.
        assert_eq!(gaps[0].points, vec![(2, 5.0), (5, 5.0)]);
        assert!(gaps[0].is_flat());

        let resumed = segments.last().unwrap();
        assert!(!resumed.is_gap);
        assert_eq!(resumed.points, vec![(5, 8.0), (6, 9.0)]);
    }

    #[test]
    fn late_joiner_gets_origin_anchor_not_gap() {
        let values = [None, None, Some(0.0), Some(2.0)];
        let mask = [false, false, true, true];
        let input = ReconstructInput {
            values: &values,
            zone_ids: &warm(4),
            mask: &mask,
            currently_active: true,
            now_tick: 3,
        };
        let segments = reconstruct(&input, &zones());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].points, vec![(0, 0.0), (2, 0.0), (3, 2.0)]);
        assert!(!segments[0].is_gap);
    }

    #[test]
    fn series_ending_mid_gap_closes_flat_to_final_tick() {
        let values = [Some(3.0), None, None, None];
        let mask = [true, false, false, false];
        let input = ReconstructInput {
            values: &values,
            zone_ids: &warm(4),
            mask: &mask,
            currently_active: false,
            now_tick: 3,
        };
        let segments = reconstruct(&input, &zones());
        let gap = segments.last().unwrap();
        assert!(gap.is_gap);
        assert_eq!(gap.points, vec![(0, 3.0), (3, 3.0)]);
    }

    #[test]
    fn live_participant_extends_gap_to_now() {
        let values = [Some(3.0), None];
        let mask = [true, false];
        let input = ReconstructInput {
            values: &values,
            zone_ids: &warm(2),
            mask: &mask,
            currently_active: true,
            now_tick: 9,
        };
        let segments = reconstruct(&input, &zones());
        assert_eq!(segments.last().unwrap().points, vec![(0, 3.0), (9, 3.0)]);
    }

    #[test]
    fn recorded_idle_values_classify_as_idle_gap() {
        // Values keep arriving but the mask says inactive: Idle, and
        // the frozen cumulative value never draws a diagonal.
        let values = [Some(4.0), Some(4.0), Some(4.0)];
        let mask = [true, false, false];
        let input = ReconstructInput {
            values: &values,
            zone_ids: &warm(3),
            mask: &mask,
            currently_active: false,
            now_tick: 2,
        };
        let segments = reconstruct(&input, &zones());
        let gap = segments.last().unwrap();
        assert!(gap.is_gap);
        assert_eq!(gap.status, SegmentStatus::Idle);
    }

    #[test]
    fn zone_change_splits_segments_at_shared_boundary() {
        let mut zone_ids = warm(4);
        zone_ids[2] = Some("rest".to_string());
        zone_ids[3] = Some("rest".to_string());
        let values = [Some(1.0), Some(2.0), Some(2.0), Some(2.0)];
        let mask = [true, true, true, true];
        let input = ReconstructInput {
            values: &values,
            zone_ids: &zone_ids,
            mask: &mask,
            currently_active: true,
            now_tick: 3,
        };
        let segments = reconstruct(&input, &zones());
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].last_tick(), Some(2));
        assert_eq!(segments[1].points.first(), Some(&(2, 2.0)));
    }

    #[test]
    fn empty_and_fully_null_series_reconstruct_to_nothing() {
        let input = ReconstructInput {
            values: &[],
            zone_ids: &[],
            mask: &[],
            currently_active: false,
            now_tick: 0,
        };
        assert!(reconstruct(&input, &zones()).is_empty());

        let values = [None, None, None];
        let input = ReconstructInput {
            values: &values,
            zone_ids: &warm(3),
            mask: &[false, false, false],
            currently_active: false,
            now_tick: 2,
        };
        assert!(reconstruct(&input, &zones()).is_empty());
    }

    #[test]
    fn polish_flattens_zero_rate_and_reinterpolates_flat_segments() {
        let zones = zones();
        let mut segments = vec![
            // Warm (rate 2) recorded flat: sampling artifact.
            ChartSegment {
                zone_id: Some("warm".into()),
                color: Some("#4caf50".into()),
                status: SegmentStatus::Active,
                is_gap: false,
                points: vec![(0, 5.0), (2, 5.0)],
            },
            // Gap after it shifts with the seam.
            ChartSegment {
                zone_id: Some("warm".into()),
                color: Some("#4caf50".into()),
                status: SegmentStatus::Idle,
                is_gap: true,
                points: vec![(2, 5.0), (4, 5.0)],
            },
            // Rest (rate 0) with a recorded wobble: forced flat.
            ChartSegment {
                zone_id: Some("rest".into()),
                color: Some("#999".into()),
                status: SegmentStatus::Active,
                is_gap: false,
                points: vec![(4, 5.0), (5, 5.4)],
            },
        ];
        // One tick per coin time unit: per-tick rate == zone rate.
        polish_segments(&mut segments, &zones, 1_000, 1_000);

        assert_eq!(segments[0].points, vec![(0, 5.0), (2, 9.0)]);
        // Gap shifted by the +4 seam delta, still flat.
        assert_eq!(segments[1].points, vec![(2, 9.0), (4, 9.0)]);
        assert!(segments[1].is_flat());
        // Zero-rate segment flattened at its (shifted) first value.
        assert_eq!(segments[2].points, vec![(4, 9.0), (5, 9.0)]);
    }
}
