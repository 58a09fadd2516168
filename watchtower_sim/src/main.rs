//! WatchTower scenario harness CLI
//!
//! Replays a scripted cab scenario through the tracking engine on a
//! hand-advanced clock and logs the resulting event stream, then prints a
//! summary with ledger verification results.

mod scenarios;

use anyhow::Result;
use clap::Parser;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use scenarios::ScenarioId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use watchtower_core::{
    AlertPayload, ArrivalKind, GeoPoint, ManualClock, Severity, SignedCredential,
    TrackingCoordinator, ZoneEvent, ZoneIndex, ZoneSubscription,
};

#[derive(Debug, Parser)]
#[command(name = "watchtower-sim", about = "Deterministic WatchTower scenario replays")]
struct Args {
    /// Scenario to replay
    #[arg(value_enum)]
    scenario: ScenarioId,

    /// Number of position events to feed
    #[arg(long, default_value_t = 20)]
    steps: usize,

    /// Log every zone-room event, not just the global stream
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    run(args)
}

fn run(args: Args) -> Result<()> {
    info!(scenario = args.scenario.name(), steps = args.steps, "starting replay");

    let zones = ZoneIndex::new(scenarios::stations())?;
    let clock = Arc::new(ManualClock::new(args.scenario.start_ms()));
    let coordinator =
        TrackingCoordinator::with_clock(zones, scenarios::reference_config(), clock.clone());

    let mut rooms: Vec<ZoneSubscription> = coordinator
        .zones()
        .iter()
        .filter_map(|z| coordinator.subscribe(&z.id))
        .collect();
    let mut global = coordinator.subscribe_all();

    let mut agents = BTreeSet::new();
    for step in scenarios::steps(args.scenario, args.steps) {
        clock.advance(step.advance_ms);
        let state = coordinator.ingest(step.agent_id, step.lat, step.lon)?;
        agents.insert(step.agent_id);
        debug!(
            agent = %state.agent_id,
            zone = %state.zone_id,
            risk = state.risk_score,
            alert = state.is_alert,
            "ingested"
        );

        log_global(&mut global);
        for room in &mut rooms {
            log_room(room);
        }
    }

    // External submitter path: a signed distress button press from the
    // last tracked cab's position.
    if args.scenario == ScenarioId::NightCrawl {
        let submitter = SigningKey::generate(&mut OsRng);
        let payload = AlertPayload {
            agent_id: "cab-202".to_string(),
            trip_token: coordinator.agent_state("cab-202").map(|s| s.trip_token),
            location: GeoPoint::new(28.8227, 77.0920),
            severity: Severity::Critical,
            triggers: Vec::new(),
            note: Some("panic button".to_string()),
            timestamp_ms: clock.now_ms(),
        };
        let credential = SignedCredential::sign(&payload, &submitter)?;
        let record = coordinator.submit_external_alert(payload, Some(credential))?;
        info!(alert_id = %record.id, "external signed alert accepted");
    }

    summarize(&coordinator, &agents);
    Ok(())
}

fn log_global(rx: &mut broadcast::Receiver<ZoneEvent>) {
    while let Ok(event) = rx.try_recv() {
        match event {
            ZoneEvent::TraceAppended { agent_id, chain } => {
                info!(agent = %agent_id, len = chain.len(), "custody chain extended");
            }
            ZoneEvent::Distress { record, triggers } => {
                warn!(
                    alert_id = %record.id,
                    agent = %record.payload.agent_id,
                    source = ?record.source,
                    ?triggers,
                    "distress broadcast"
                );
            }
            _ => {}
        }
    }
}

fn log_room(room: &mut ZoneSubscription) {
    while let Ok(event) = room.events.try_recv() {
        match event {
            ZoneEvent::CabLeft { agent_id, zone_id } => {
                info!(agent = %agent_id, zone = %zone_id, "cab left jurisdiction");
            }
            ZoneEvent::IncomingCab {
                state,
                kind,
                eta_secs,
            } => match kind {
                ArrivalKind::Actual => {
                    info!(agent = %state.agent_id, zone = %room.zone_id, "cab arrived");
                }
                ArrivalKind::Predicted => {
                    info!(
                        agent = %state.agent_id,
                        zone = %room.zone_id,
                        eta_secs = eta_secs.unwrap_or(0),
                        "cab predicted incoming"
                    );
                }
            },
            ZoneEvent::CabUpdate { state } => {
                debug!(agent = %state.agent_id, risk = state.risk_score, "routine update");
            }
            _ => {}
        }
    }
}

fn summarize<C: watchtower_core::Clock>(
    coordinator: &TrackingCoordinator<C>,
    agents: &BTreeSet<&'static str>,
) {
    for agent in agents {
        let chain = coordinator.trace_chain(agent);
        let verified = watchtower_core::chain::verify_chain(&chain);
        info!(
            agent = %agent,
            transitions = chain.len(),
            chain_verified = verified,
            "custody summary"
        );
    }
    let alerts = coordinator.buffered_alerts();
    info!(
        alerts = alerts.len(),
        alert_chain_verified = coordinator.alert_ledger().verify(),
        "alert ledger summary"
    );
}
