//! Scripted scenarios replayed through the engine.
//!
//! Each scenario is a fixed list of (agent, position, clock-advance) steps,
//! so a run is fully determined by the scenario id and step count.

use clap::ValueEnum;
use watchtower_core::{
    BoundingBox, CoordinatorConfig, DistressConfig, GeoPoint, RiskConfig, Zone, ZoneMetadata,
};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioId {
    /// SIM-001: A steady run from the southern to the northern station
    HandoffRun,

    /// SIM-002: A night-time crawl inside a low-density sector
    NightCrawl,

    /// SIM-003: Rapid ping-pong between two adjacent jurisdictions
    ZoneChurn,
}

impl ScenarioId {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::HandoffRun => "handoff-run",
            ScenarioId::NightCrawl => "night-crawl",
            ScenarioId::ZoneChurn => "zone-churn",
        }
    }

    /// Epoch-millis start instant. NightCrawl begins around 03:00 local;
    /// the others mid-morning.
    pub fn start_ms(&self) -> i64 {
        match self {
            ScenarioId::NightCrawl => 1_700_000_000_000,
            _ => 1_700_036_000_000,
        }
    }
}

/// One inbound position event plus the clock advance that precedes it.
#[derive(Debug, Clone)]
pub struct Step {
    pub agent_id: &'static str,
    pub lat: f64,
    pub lon: f64,
    pub advance_ms: i64,
}

/// The reference station layout: four Delhi-area stations.
pub fn stations() -> Vec<Zone> {
    vec![
        Zone::new("st-cp", "Connaught Place", 28.6315, 77.2167).with_metadata(ZoneMetadata {
            area: Some("Central Delhi".to_string()),
            address: Some("Parliament Street".to_string()),
            phone: Some("011-23344556".to_string()),
        }),
        Zone::new("st-kash", "Kashmere Gate", 28.6675, 77.2273).with_metadata(ZoneMetadata {
            area: Some("North Delhi".to_string()),
            address: Some("Lothian Road".to_string()),
            phone: Some("011-23862222".to_string()),
        }),
        Zone::new("st-saket", "Saket", 28.5245, 77.2066),
        Zone::new("st-narela", "Narela", 28.8227, 77.0920),
    ]
}

/// Shared pipeline config: IST offset, ring-road reference points, and the
/// low-density sector around the northern outskirts.
pub fn reference_config() -> CoordinatorConfig {
    CoordinatorConfig {
        risk: RiskConfig {
            utc_offset_minutes: 330,
            road_points: vec![
                GeoPoint::new(28.6315, 77.2167),
                GeoPoint::new(28.6675, 77.2273),
                GeoPoint::new(28.5245, 77.2066),
            ],
            isolated_areas: vec![BoundingBox::new(28.78, 77.05, 28.87, 77.14)],
        },
        distress: DistressConfig {
            isolated_areas: vec![BoundingBox::new(28.78, 77.05, 28.87, 77.14)],
            ..Default::default()
        },
        horizon_secs: None,
    }
}

/// The scripted steps for a scenario, truncated or cycled to `count`.
pub fn steps(scenario: ScenarioId, count: usize) -> Vec<Step> {
    match scenario {
        ScenarioId::HandoffRun => handoff_run(count),
        ScenarioId::NightCrawl => night_crawl(count),
        ScenarioId::ZoneChurn => zone_churn(count),
    }
}

/// Steady 30s-cadence drive from Saket up through Connaught Place to
/// Kashmere Gate.
fn handoff_run(count: usize) -> Vec<Step> {
    let start = GeoPoint::new(28.5245, 77.2066);
    let end = GeoPoint::new(28.6675, 77.2273);
    (0..count)
        .map(|i| {
            let t = i as f64 / (count.max(2) - 1) as f64;
            Step {
                agent_id: "cab-101",
                lat: start.lat + (end.lat - start.lat) * t,
                lon: start.lon + (end.lon - start.lon) * t,
                advance_ms: 30_000,
            }
        })
        .collect()
}

/// Long-gap, near-zero-displacement reports inside the Narela sector.
fn night_crawl(count: usize) -> Vec<Step> {
    (0..count)
        .map(|i| Step {
            agent_id: "cab-202",
            lat: 28.8227 + 0.00001 * (i % 3) as f64,
            lon: 77.0920,
            advance_ms: 240_000,
        })
        .collect()
}

/// Ping-pong between Connaught Place and Kashmere Gate every 30 seconds.
fn zone_churn(count: usize) -> Vec<Step> {
    (0..count)
        .map(|i| {
            let (lat, lon) = if i % 2 == 0 {
                (28.6315, 77.2167)
            } else {
                (28.6675, 77.2273)
            };
            Step {
                agent_id: "cab-303",
                lat,
                lon,
                advance_ms: 30_000,
            }
        })
        .collect()
}
