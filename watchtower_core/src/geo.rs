//! The "GRID" Engine - Jurisdiction Zones & Great-Circle Geometry
//!
//! Every other engine reads positions through this module:
//! - Haversine great-circle distance (the one distance formula in the system)
//! - Initial bearing and forward-geodesic projection for dead reckoning
//! - The static station registry with nearest-zone / containment queries

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by every great-circle computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Containment radius assigned to stations that don't declare their own.
pub const DEFAULT_ZONE_RADIUS_KM: f64 = 2.0;

/// A WGS84 surface point (no altitude - cabs live on roads).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine great-circle distance in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `from` to `to`, degrees clockwise from north in [0, 360).
pub fn bearing_deg(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();
    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Forward-geodesic destination: travel `distance_km` from `origin` along `bearing`.
pub fn project_point(origin: GeoPoint, bearing: f64, distance_km: f64) -> GeoPoint {
    let ang = distance_km / EARTH_RADIUS_KM;
    let brg = bearing.to_radians();
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();

    let lat2 = (lat1.sin() * ang.cos() + lat1.cos() * ang.sin() * brg.cos()).asin();
    let lon2 = lon1
        + (brg.sin() * ang.sin() * lat1.cos()).atan2(ang.cos() - lat1.sin() * lat2.sin());

    GeoPoint {
        lat: lat2.to_degrees(),
        lon: lon2.to_degrees(),
    }
}

/// Axis-aligned lat/lon box, used for the low-density ("isolated") area tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }
}

/// Optional descriptive fields carried by a station record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneMetadata {
    pub area: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// A fixed jurisdiction zone ("station"): center point plus containment radius.
///
/// Immutable after registration; the index validates ids and radii at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub center: GeoPoint,
    pub radius_km: f64,
    pub metadata: Option<ZoneMetadata>,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            center: GeoPoint::new(lat, lon),
            radius_km: DEFAULT_ZONE_RADIUS_KM,
            metadata: None,
        }
    }

    pub fn with_radius(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn with_metadata(mut self, metadata: ZoneMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Zone registry construction errors - all fatal at startup.
#[derive(Debug, Clone, Error)]
pub enum GeoError {
    #[error("no zones registered")]
    NoZones,

    #[error("duplicate zone id: {0}")]
    DuplicateZone(String),

    #[error("zone {0} has a non-positive containment radius")]
    InvalidRadius(String),
}

/// The owning zone of a point: nearest by great-circle distance, whether or
/// not the point falls inside its containment radius.
#[derive(Debug, Clone)]
pub struct ZoneFix<'a> {
    pub zone: &'a Zone,
    pub distance_km: f64,
    pub inside_radius: bool,
}

/// Static registry of jurisdiction zones with nearest-zone queries.
///
/// Zone counts are small (tens of stations per deployment), so queries are a
/// linear scan with a deterministic (distance, id) ordering.
pub struct ZoneIndex {
    zones: Vec<Zone>,
}

impl ZoneIndex {
    /// Validates and freezes the registry. Fails when the set is empty,
    /// an id repeats, or a radius is non-positive.
    pub fn new(zones: Vec<Zone>) -> Result<Self, GeoError> {
        if zones.is_empty() {
            return Err(GeoError::NoZones);
        }
        let mut seen = std::collections::HashSet::new();
        for zone in &zones {
            if !seen.insert(zone.id.clone()) {
                return Err(GeoError::DuplicateZone(zone.id.clone()));
            }
            if zone.radius_km <= 0.0 {
                return Err(GeoError::InvalidRadius(zone.id.clone()));
            }
        }
        Ok(Self { zones })
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    /// The `k` nearest zones to a point, ordered by (distance, id).
    /// Ties break on the lower zone id so results are deterministic.
    pub fn nearest(&self, p: GeoPoint, k: usize) -> Vec<(&Zone, f64)> {
        let mut ranked: Vec<(&Zone, f64)> = self
            .zones
            .iter()
            .map(|z| (z, haversine_km(p, z.center)))
            .collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        ranked.truncate(k);
        ranked
    }

    /// Resolves the owning zone of a point. Total: the registry is known
    /// non-empty, so there is always a nearest zone.
    pub fn owning_zone(&self, p: GeoPoint) -> ZoneFix<'_> {
        // new() rejects empty registries, so nearest(_, 1) is never empty
        let (zone, distance_km) = self.nearest(p, 1).remove(0);
        ZoneFix {
            zone,
            distance_km,
            inside_radius: distance_km <= zone.radius_km,
        }
    }
}
