//! Dead-reckoned jurisdiction handoff prediction.
//!
//! Projects the agent's last known motion forward over a fixed horizon and
//! reports the owning zone of the projected point when it differs from the
//! current one. Deliberately coarse - no map awareness, no route search.

use crate::geo::{bearing_deg, haversine_km, project_point, GeoPoint, ZoneIndex};
use crate::history::PositionSample;
use serde::{Deserialize, Serialize};

pub const HORIZON_MIN_SECS: f64 = 60.0;
pub const HORIZON_MAX_SECS: f64 = 120.0;
pub const HORIZON_NOMINAL_SECS: f64 = 90.0;

/// Upper bound reported for arrival estimates.
const ETA_CEILING_SECS: u64 = 3600;

/// A probable next-zone handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub zone_id: String,
    pub zone_name: String,
    /// Estimated seconds until the agent reaches the zone center at its
    /// current speed.
    pub eta_secs: u64,
    pub projected: GeoPoint,
}

/// Forward-projects the last leg of an agent's history.
pub struct HandoffPredictor {
    horizon_secs: f64,
}

impl HandoffPredictor {
    /// Horizon is clamped to [60, 120] seconds.
    pub fn new(horizon_secs: f64) -> Self {
        Self {
            horizon_secs: horizon_secs.clamp(HORIZON_MIN_SECS, HORIZON_MAX_SECS),
        }
    }

    pub fn nominal() -> Self {
        Self::new(HORIZON_NOMINAL_SECS)
    }

    pub fn horizon_secs(&self) -> f64 {
        self.horizon_secs
    }

    /// Predicts the next owning zone, or `None` when the agent is too new,
    /// stationary, or projected to stay where it is.
    pub fn predict(
        &self,
        history: &[PositionSample],
        zones: &ZoneIndex,
        current_zone_id: &str,
    ) -> Option<Handoff> {
        if history.len() < 2 {
            return None;
        }
        let prev = &history[history.len() - 2];
        let last = &history[history.len() - 1];

        let dt_secs = (last.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
        if dt_secs <= 0.0 {
            return None;
        }
        let leg_km = haversine_km(prev.point, last.point);
        if leg_km <= 0.0 {
            return None;
        }

        let speed_kms = leg_km / dt_secs;
        let bearing = bearing_deg(prev.point, last.point);
        let projected = project_point(last.point, bearing, speed_kms * self.horizon_secs);

        let fix = zones.owning_zone(projected);
        if fix.zone.id == current_zone_id {
            return None;
        }

        let eta_secs = (haversine_km(last.point, fix.zone.center) / speed_kms)
            .round()
            .clamp(1.0, ETA_CEILING_SECS as f64) as u64;

        Some(Handoff {
            zone_id: fix.zone.id.clone(),
            zone_name: fix.zone.name.clone(),
            eta_secs,
            projected,
        })
    }
}

impl Default for HandoffPredictor {
    fn default() -> Self {
        Self::nominal()
    }
}
