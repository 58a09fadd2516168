//! Discrete distress triggers, evaluated independently of the continuous
//! risk score. Any subset can fire on a single update.

use crate::geo::{haversine_km, BoundingBox};
use crate::history::PositionSample;
use crate::risk::path_deviation_pct;
use crate::trace::TraceEntry;
use serde::{Deserialize, Serialize};

/// Risk score at or above which an update is critical.
pub const RISK_CRITICAL_THRESHOLD: u8 = 75;
/// Risk score at or above which an update is high severity.
pub const RISK_HIGH_THRESHOLD: u8 = 50;

/// Named boolean anomaly conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Composite risk score crossed the critical threshold.
    RiskCritical,
    /// No meaningful movement across a long inter-sample gap.
    StoppedExtended,
    /// Cumulative path deviation ran past the route limit.
    RouteDeviation,
    /// Zone churn: too many custody transitions in a short window.
    AbnormalHopping,
    /// Repeated crawl-and-stop legs inside a low-density area.
    StopStartIsolated,
}

/// Alert severity derived from the risk score at trigger time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_risk(score: u8) -> Self {
        if score >= RISK_CRITICAL_THRESHOLD {
            Severity::Critical
        } else if score >= RISK_HIGH_THRESHOLD {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// Trigger thresholds plus the shared low-density area table.
#[derive(Debug, Clone)]
pub struct DistressConfig {
    pub stop_gap_secs: i64,
    pub stop_displacement_m: f64,
    pub deviation_limit_pct: f64,
    pub hop_window_secs: i64,
    pub hop_count: usize,
    pub crawl_displacement_m: f64,
    pub isolated_areas: Vec<BoundingBox>,
}

impl Default for DistressConfig {
    fn default() -> Self {
        Self {
            stop_gap_secs: 180,
            stop_displacement_m: 50.0,
            deviation_limit_pct: 40.0,
            hop_window_secs: 120,
            hop_count: 3,
            crawl_displacement_m: 20.0,
            isolated_areas: Vec::new(),
        }
    }
}

/// Evaluates the trigger set for one agent update.
pub struct DistressDetector {
    config: DistressConfig,
}

impl DistressDetector {
    pub fn new(config: DistressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DistressConfig {
        &self.config
    }

    /// All triggers that currently hold. Pure over the inputs; `now_ms` is
    /// injected by the caller.
    pub fn evaluate(
        &self,
        history: &[PositionSample],
        trace: &[TraceEntry],
        risk_score: u8,
        now_ms: i64,
    ) -> Vec<TriggerKind> {
        let mut triggers = Vec::new();

        if risk_score >= RISK_CRITICAL_THRESHOLD {
            triggers.push(TriggerKind::RiskCritical);
        }
        if self.stopped_extended(history) {
            triggers.push(TriggerKind::StoppedExtended);
        }
        if self.route_deviated(history) {
            triggers.push(TriggerKind::RouteDeviation);
        }
        if self.abnormal_hopping(trace, now_ms) {
            triggers.push(TriggerKind::AbnormalHopping);
        }
        if self.stop_start_isolated(history) {
            triggers.push(TriggerKind::StopStartIsolated);
        }
        triggers
    }

    /// Latest inter-sample gap is long and nearly displacement-free.
    fn stopped_extended(&self, history: &[PositionSample]) -> bool {
        let Some(pair) = history.len().checked_sub(2).map(|i| &history[i..]) else {
            return false;
        };
        let gap_secs = (pair[1].timestamp_ms - pair[0].timestamp_ms) / 1000;
        let displacement_m = haversine_km(pair[0].point, pair[1].point) * 1000.0;
        gap_secs > self.config.stop_gap_secs && displacement_m < self.config.stop_displacement_m
    }

    /// Raw cumulative deviation percent past the route limit.
    fn route_deviated(&self, history: &[PositionSample]) -> bool {
        path_deviation_pct(history)
            .map(|pct| pct > self.config.deviation_limit_pct)
            .unwrap_or(false)
    }

    /// Trace-chain churn inside the trailing window.
    fn abnormal_hopping(&self, trace: &[TraceEntry], now_ms: i64) -> bool {
        let cutoff_ms = now_ms - self.config.hop_window_secs * 1000;
        let recent = trace.iter().filter(|e| e.timestamp_ms >= cutoff_ms).count();
        recent >= self.config.hop_count
    }

    /// Two or more crawl legs among the last three, ending inside a
    /// low-density area.
    fn stop_start_isolated(&self, history: &[PositionSample]) -> bool {
        let Some(last) = history.last() else {
            return false;
        };
        if !self.config.isolated_areas.iter().any(|b| b.contains(last.point)) {
            return false;
        }
        let legs = history.len().saturating_sub(1).min(3);
        if legs < 2 {
            return false;
        }
        let tail = &history[history.len() - legs - 1..];
        let crawls = tail
            .windows(2)
            .filter(|pair| {
                haversine_km(pair[0].point, pair[1].point) * 1000.0
                    < self.config.crawl_displacement_m
            })
            .count();
        crawls >= 2
    }
}

impl Default for DistressDetector {
    fn default() -> Self {
        Self::new(DistressConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoPoint, Zone};
    use crate::trace::TraceLedger;

    fn sample(lat: f64, lon: f64, ts: i64) -> PositionSample {
        PositionSample::new("cab-1", GeoPoint::new(lat, lon), ts)
    }

    fn isolated_detector() -> DistressDetector {
        DistressDetector::new(DistressConfig {
            isolated_areas: vec![BoundingBox::new(28.0, 77.0, 28.1, 77.1)],
            ..Default::default()
        })
    }

    #[test]
    fn test_no_triggers_on_quiet_history() {
        let detector = DistressDetector::default();
        let history = vec![
            sample(28.0, 77.0, 0),
            sample(28.01, 77.0, 30_000),
            sample(28.02, 77.0, 60_000),
        ];
        assert!(detector.evaluate(&history, &[], 10, 60_000).is_empty());
    }

    #[test]
    fn test_risk_critical_threshold() {
        let detector = DistressDetector::default();
        assert!(detector
            .evaluate(&[], &[], RISK_CRITICAL_THRESHOLD, 0)
            .contains(&TriggerKind::RiskCritical));
        assert!(!detector
            .evaluate(&[], &[], RISK_CRITICAL_THRESHOLD - 1, 0)
            .contains(&TriggerKind::RiskCritical));
    }

    #[test]
    fn test_stopped_extended_fires_on_ten_minute_stop() {
        let detector = DistressDetector::default();
        let history = vec![sample(28.0, 77.0, 0), sample(28.0, 77.0, 600_000)];
        let triggers = detector.evaluate(&history, &[], 0, 600_000);
        assert!(triggers.contains(&TriggerKind::StoppedExtended));
    }

    #[test]
    fn test_stopped_extended_needs_both_conditions() {
        let detector = DistressDetector::default();
        // Long gap but real displacement
        let moved = vec![sample(28.0, 77.0, 0), sample(28.1, 77.0, 600_000)];
        assert!(!detector
            .evaluate(&moved, &[], 0, 600_000)
            .contains(&TriggerKind::StoppedExtended));
        // No displacement but short gap
        let brief = vec![sample(28.0, 77.0, 0), sample(28.0, 77.0, 60_000)];
        assert!(!detector
            .evaluate(&brief, &[], 0, 60_000)
            .contains(&TriggerKind::StoppedExtended));
    }

    #[test]
    fn test_route_deviation_fires_past_limit() {
        let detector = DistressDetector::default();
        let history = vec![
            sample(28.00, 77.00, 0),
            sample(28.05, 77.10, 60_000),
            sample(28.01, 77.00, 120_000),
        ];
        assert!(detector
            .evaluate(&history, &[], 0, 120_000)
            .contains(&TriggerKind::RouteDeviation));
    }

    #[test]
    fn test_abnormal_hopping_counts_recent_entries() {
        let detector = DistressDetector::default();
        let ledger = TraceLedger::new();
        let zone_a = Zone::new("st-01", "A", 28.0, 77.0);
        let zone_b = Zone::new("st-02", "B", 28.1, 77.0);
        ledger.append("cab-1", &zone_a, 10_000).unwrap();
        ledger.append("cab-1", &zone_b, 50_000).unwrap();
        let chain = ledger.append("cab-1", &zone_a, 100_000).unwrap();

        // All three transitions inside the trailing 120s
        assert!(detector
            .evaluate(&[], &chain, 0, 110_000)
            .contains(&TriggerKind::AbnormalHopping));
        // Window slid past the first transition
        assert!(!detector
            .evaluate(&[], &chain, 0, 200_000)
            .contains(&TriggerKind::AbnormalHopping));
    }

    #[test]
    fn test_stop_start_isolated_fires_inside_area() {
        let detector = isolated_detector();
        // Four samples, three crawl legs, ending inside the box
        let history = vec![
            sample(28.05, 77.05, 0),
            sample(28.05001, 77.05, 60_000),
            sample(28.05002, 77.05, 120_000),
            sample(28.05003, 77.05, 180_000),
        ];
        assert!(detector
            .evaluate(&history, &[], 0, 180_000)
            .contains(&TriggerKind::StopStartIsolated));
    }

    #[test]
    fn test_stop_start_outside_area_is_quiet() {
        let detector = isolated_detector();
        let history = vec![
            sample(28.50, 77.50, 0),
            sample(28.50001, 77.50, 60_000),
            sample(28.50002, 77.50, 120_000),
            sample(28.50003, 77.50, 180_000),
        ];
        assert!(!detector
            .evaluate(&history, &[], 0, 180_000)
            .contains(&TriggerKind::StopStartIsolated));
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(Severity::from_risk(80), Severity::Critical);
        assert_eq!(Severity::from_risk(75), Severity::Critical);
        assert_eq!(Severity::from_risk(60), Severity::High);
        assert_eq!(Severity::from_risk(50), Severity::High);
        assert_eq!(Severity::from_risk(20), Severity::Medium);
    }

    #[test]
    fn test_triggers_can_stack() {
        let detector = isolated_detector();
        let history = vec![
            sample(28.05, 77.05, 0),
            sample(28.05, 77.05, 300_000),
            sample(28.05, 77.05, 600_000),
            sample(28.05, 77.05, 900_000),
        ];
        let triggers = detector.evaluate(&history, &[], 90, 900_000);
        assert!(triggers.contains(&TriggerKind::RiskCritical));
        assert!(triggers.contains(&TriggerKind::StoppedExtended));
        assert!(triggers.contains(&TriggerKind::StopStartIsolated));
    }
}
