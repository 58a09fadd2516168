//! The "RISK" Engine - Composite Anomaly Scoring
//!
//! Converts an agent's recent history plus static reference tables into a
//! 0-100 anomaly score. Five independent bounded signals, combined by fixed
//! weights:
//!
//! | signal            | cap | weight |
//! |-------------------|-----|--------|
//! | time of day       |  25 |  0.20  |
//! | path deviation    |  30 |  0.25  |
//! | kinematic anomaly |  25 |  0.25  |
//! | road proximity    |  15 |  0.15  |
//! | isolated zone     |  20 |  0.15  |
//!
//! Each signal is normalized by its cap before weighting, so the composite
//! spans the full [0, 100] range. All of it is pure computation over the
//! history and the config tables - time is injected, never read ambiently.

use crate::geo::{bearing_deg, haversine_km, BoundingBox, GeoPoint};
use crate::history::PositionSample;

pub const WEIGHT_TIME_OF_DAY: f64 = 0.20;
pub const WEIGHT_PATH_DEVIATION: f64 = 0.25;
pub const WEIGHT_KINEMATIC: f64 = 0.25;
pub const WEIGHT_ROAD_PROXIMITY: f64 = 0.15;
pub const WEIGHT_ISOLATION: f64 = 0.15;

pub const TIME_OF_DAY_CAP: f64 = 25.0;
pub const PATH_DEVIATION_CAP: f64 = 30.0;
pub const KINEMATIC_CAP: f64 = 25.0;
pub const ROAD_PROXIMITY_CAP: f64 = 15.0;
pub const ISOLATION_CAP: f64 = 20.0;

/// Kinematic window and penalties.
const KINEMATIC_WINDOW: usize = 5;
const STOP_GAP_SECS: i64 = 60;
const STOP_DISPLACEMENT_M: f64 = 50.0;
const STOP_PENALTY: f64 = 10.0;
const ZIGZAG_TURN_DEG: f64 = 90.0;
const ZIGZAG_PENALTY: f64 = 5.0;

/// Legs shorter than this contribute no usable bearing.
const MIN_LEG_KM: f64 = 0.005;

/// Static reference tables plus the local-time offset.
#[derive(Debug, Clone, Default)]
pub struct RiskConfig {
    /// Offset applied to injected epoch millis before extracting the
    /// wall-clock hour.
    pub utc_offset_minutes: i32,
    /// Arterial-road reference points for the proximity signal.
    pub road_points: Vec<GeoPoint>,
    /// Low-density areas for the isolation signal.
    pub isolated_areas: Vec<BoundingBox>,
}

/// Local wall-clock hour [0, 23] for an epoch-millis instant.
pub fn local_hour(now_ms: i64, utc_offset_minutes: i32) -> u32 {
    let local_ms = now_ms + i64::from(utc_offset_minutes) * 60_000;
    (((local_ms.div_euclid(3_600_000)) % 24 + 24) % 24) as u32
}

/// Night-hour signal: 25 inside 22:00-05:00, 15 on the shoulder hours
/// (21:00 and 05:00-06:00), 0 otherwise.
pub fn time_of_day_score(hour: u32) -> f64 {
    match hour {
        22..=23 | 0..=4 => 25.0,
        21 | 5 => 15.0,
        _ => 0.0,
    }
}

/// Raw path deviation percent: how much longer the travelled polyline is
/// than the straight line between the endpoints. Needs at least 3 samples;
/// near-zero straight-line spans report no deviation. Uncapped - the
/// distress detector compares the raw value against its own limit.
pub fn path_deviation_pct(history: &[PositionSample]) -> Option<f64> {
    if history.len() < 3 {
        return None;
    }
    let polyline_km: f64 = history
        .windows(2)
        .map(|pair| haversine_km(pair[0].point, pair[1].point))
        .sum();
    let straight_km = haversine_km(
        history[0].point,
        history[history.len() - 1].point,
    );
    if straight_km < MIN_LEG_KM {
        return Some(0.0);
    }
    Some(((polyline_km - straight_km) / straight_km * 100.0).max(0.0))
}

/// Kinematic anomaly over the trailing window: stop penalties for long
/// gaps with little displacement, zig-zag penalties for hard bearing
/// reversals between consecutive legs. Capped at [`KINEMATIC_CAP`].
pub fn kinematic_score(history: &[PositionSample]) -> f64 {
    let window = if history.len() > KINEMATIC_WINDOW {
        &history[history.len() - KINEMATIC_WINDOW..]
    } else {
        history
    };
    if window.len() < 2 {
        return 0.0;
    }

    let mut score = 0.0;
    for pair in window.windows(2) {
        let gap_secs = (pair[1].timestamp_ms - pair[0].timestamp_ms) / 1000;
        let displacement_m = haversine_km(pair[0].point, pair[1].point) * 1000.0;
        if gap_secs > STOP_GAP_SECS && displacement_m < STOP_DISPLACEMENT_M {
            score += STOP_PENALTY;
        }
    }

    for triple in window.windows(3) {
        let leg_a = haversine_km(triple[0].point, triple[1].point);
        let leg_b = haversine_km(triple[1].point, triple[2].point);
        if leg_a < MIN_LEG_KM || leg_b < MIN_LEG_KM {
            continue;
        }
        let b1 = bearing_deg(triple[0].point, triple[1].point);
        let b2 = bearing_deg(triple[1].point, triple[2].point);
        if turn_angle_deg(b1, b2) > ZIGZAG_TURN_DEG {
            score += ZIGZAG_PENALTY;
        }
    }

    score.min(KINEMATIC_CAP)
}

/// Absolute turn between two bearings, folded into [0, 180].
fn turn_angle_deg(b1: f64, b2: f64) -> f64 {
    let diff = (b2 - b1).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Distance-to-arterial signal: >5 km from every reference point scores 15,
/// >2 km scores 8. An empty table scores 0 - no data is not an anomaly.
pub fn road_proximity_score(p: GeoPoint, road_points: &[GeoPoint]) -> f64 {
    let nearest_km = road_points
        .iter()
        .map(|r| haversine_km(p, *r))
        .fold(f64::INFINITY, f64::min);
    if !nearest_km.is_finite() {
        return 0.0;
    }
    if nearest_km > 5.0 {
        15.0
    } else if nearest_km > 2.0 {
        8.0
    } else {
        0.0
    }
}

/// Flat isolation signal: the point sits inside a configured low-density box.
pub fn isolation_score(p: GeoPoint, areas: &[BoundingBox]) -> f64 {
    if areas.iter().any(|b| b.contains(p)) {
        ISOLATION_CAP
    } else {
        0.0
    }
}

/// Weighted composite scorer over history + static tables.
pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Composite anomaly score in [0, 100].
    ///
    /// Degenerate histories (0-1 samples) carry no deviation or kinematic
    /// contribution; only time-of-day and the positional signals apply.
    pub fn score(&self, history: &[PositionSample], now_ms: i64) -> u8 {
        let hour = local_hour(now_ms, self.config.utc_offset_minutes);
        let time = time_of_day_score(hour);

        let deviation = path_deviation_pct(history)
            .map(|pct| pct.min(PATH_DEVIATION_CAP))
            .unwrap_or(0.0);

        let kinematic = kinematic_score(history);

        let (road, isolation) = match history.last() {
            Some(last) => (
                road_proximity_score(last.point, &self.config.road_points),
                isolation_score(last.point, &self.config.isolated_areas),
            ),
            None => (0.0, 0.0),
        };

        let composite = (time / TIME_OF_DAY_CAP) * WEIGHT_TIME_OF_DAY * 100.0
            + (deviation / PATH_DEVIATION_CAP) * WEIGHT_PATH_DEVIATION * 100.0
            + (kinematic / KINEMATIC_CAP) * WEIGHT_KINEMATIC * 100.0
            + (road / ROAD_PROXIMITY_CAP) * WEIGHT_ROAD_PROXIMITY * 100.0
            + (isolation / ISOLATION_CAP) * WEIGHT_ISOLATION * 100.0;

        composite.round().clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(lat: f64, lon: f64, ts: i64) -> PositionSample {
        PositionSample::new("cab-1", GeoPoint::new(lat, lon), ts)
    }

    /// 2am local for an offset of zero.
    const NIGHT_MS: i64 = 2 * 3_600_000;
    /// 1pm local for an offset of zero.
    const NOON_MS: i64 = 13 * 3_600_000;

    #[test]
    fn test_local_hour_wraps_and_offsets() {
        assert_eq!(local_hour(0, 0), 0);
        assert_eq!(local_hour(NOON_MS, 0), 13);
        // +5:30 offset pushes 23:00 UTC into the next day
        assert_eq!(local_hour(23 * 3_600_000, 330), 4);
        // Negative instants still land in [0, 23]
        assert_eq!(local_hour(-3_600_000, 0), 23);
    }

    #[test]
    fn test_time_of_day_tiers() {
        assert_eq!(time_of_day_score(23), 25.0);
        assert_eq!(time_of_day_score(2), 25.0);
        assert_eq!(time_of_day_score(21), 15.0);
        assert_eq!(time_of_day_score(5), 15.0);
        assert_eq!(time_of_day_score(13), 0.0);
    }

    #[test]
    fn test_deviation_needs_three_samples() {
        let history = vec![sample(28.0, 77.0, 0), sample(28.1, 77.0, 60_000)];
        assert!(path_deviation_pct(&history).is_none());
    }

    #[test]
    fn test_straight_route_has_no_deviation() {
        let history: Vec<_> = (0..5)
            .map(|i| sample(28.0 + i as f64 * 0.01, 77.0, i * 60_000))
            .collect();
        let pct = path_deviation_pct(&history).unwrap();
        assert!(pct < 1.0, "got {}", pct);
    }

    #[test]
    fn test_detour_registers_deviation() {
        // Out-and-back dog-leg: polyline much longer than the direct span
        let history = vec![
            sample(28.00, 77.00, 0),
            sample(28.05, 77.10, 60_000),
            sample(28.01, 77.00, 120_000),
        ];
        let pct = path_deviation_pct(&history).unwrap();
        assert!(pct > 40.0, "got {}", pct);
    }

    #[test]
    fn test_kinematic_stop_penalty() {
        // Two samples 90s apart with ~0 displacement
        let history = vec![sample(28.0, 77.0, 0), sample(28.0, 77.0, 90_000)];
        assert_eq!(kinematic_score(&history), STOP_PENALTY);
    }

    #[test]
    fn test_kinematic_zigzag_penalty() {
        // North leg then back south: ~180 degree turn
        let history = vec![
            sample(28.00, 77.0, 0),
            sample(28.02, 77.0, 30_000),
            sample(28.00, 77.0, 60_000),
        ];
        assert_eq!(kinematic_score(&history), ZIGZAG_PENALTY);
    }

    #[test]
    fn test_kinematic_caps() {
        // Every gap stopped, every turn reversed - still capped
        let mut history = Vec::new();
        for i in 0..6 {
            let lat = if i % 2 == 0 { 28.00 } else { 28.02 };
            history.push(sample(lat, 77.0, i * 120_000));
        }
        assert!(kinematic_score(&history) <= KINEMATIC_CAP);
    }

    #[test]
    fn test_road_proximity_tiers() {
        let roads = vec![GeoPoint::new(28.0, 77.0)];
        assert_eq!(road_proximity_score(GeoPoint::new(28.0, 77.0), &roads), 0.0);
        // ~3.3 km north
        assert_eq!(road_proximity_score(GeoPoint::new(28.03, 77.0), &roads), 8.0);
        // ~11 km north
        assert_eq!(road_proximity_score(GeoPoint::new(28.1, 77.0), &roads), 15.0);
        assert_eq!(road_proximity_score(GeoPoint::new(28.1, 77.0), &[]), 0.0);
    }

    #[test]
    fn test_isolation_flat_score() {
        let areas = vec![BoundingBox::new(28.0, 77.0, 28.1, 77.1)];
        assert_eq!(isolation_score(GeoPoint::new(28.05, 77.05), &areas), ISOLATION_CAP);
        assert_eq!(isolation_score(GeoPoint::new(28.5, 77.05), &areas), 0.0);
    }

    #[test]
    fn test_stop_raises_score_over_moving_baseline() {
        let scorer = RiskScorer::new(RiskConfig::default());
        let moving = vec![
            sample(28.00, 77.0, 0),
            sample(28.05, 77.0, 600_000),
        ];
        let stopped = vec![
            sample(28.00, 77.0, 0),
            sample(28.00, 77.0, 600_000),
        ];
        assert!(
            scorer.score(&stopped, NOON_MS) > scorer.score(&moving, NOON_MS),
            "a 10-minute stop must outscore steady movement"
        );
    }

    #[test]
    fn test_night_raises_score() {
        let scorer = RiskScorer::new(RiskConfig::default());
        let history = vec![sample(28.0, 77.0, 0)];
        assert!(scorer.score(&history, NIGHT_MS) > scorer.score(&history, NOON_MS));
    }

    #[test]
    fn test_empty_history_scores_time_only() {
        let scorer = RiskScorer::new(RiskConfig::default());
        assert_eq!(scorer.score(&[], NOON_MS), 0);
        assert_eq!(scorer.score(&[], NIGHT_MS), 20);
    }

    proptest! {
        #[test]
        fn prop_score_always_in_bounds(
            points in prop::collection::vec((-80.0f64..80.0, -179.0f64..179.0), 0..20),
            now_ms in 0i64..4_000_000_000_000,
            offset in -720i32..720,
        ) {
            let history: Vec<_> = points
                .iter()
                .enumerate()
                .map(|(i, (lat, lon))| sample(*lat, *lon, i as i64 * 45_000))
                .collect();
            let scorer = RiskScorer::new(RiskConfig {
                utc_offset_minutes: offset,
                road_points: vec![GeoPoint::new(28.0, 77.0)],
                isolated_areas: vec![BoundingBox::new(-10.0, -10.0, 10.0, 10.0)],
            });
            let score = scorer.score(&history, now_ms);
            prop_assert!(score <= 100);
        }
    }
}
