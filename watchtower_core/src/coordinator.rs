//! The "WATCH" Engine - per-agent tracking orchestration.
//!
//! Runs the full pipeline for every inbound position sample, in a fixed
//! order: history append, zone resolution, trip token, risk score, handoff
//! prediction, custody trace, distress evaluation, fan-out. Per-agent state
//! is guarded by per-agent locks (updates for one agent serialize; distinct
//! agents proceed in parallel); the alert chain keeps its own single append
//! lock inside the ledger.

use crate::alert::{AlertError, AlertLedger, AlertPayload, AlertRecord, SignedCredential};
use crate::bus::{ArrivalKind, ZoneBus, ZoneEvent, ZoneSubscription};
use crate::chain::ChainError;
use crate::clock::{Clock, SystemClock};
use crate::distress::{DistressConfig, DistressDetector, Severity, TriggerKind};
use crate::geo::{GeoError, GeoPoint, Zone, ZoneIndex};
use crate::handoff::HandoffPredictor;
use crate::history::{HistoryStore, PositionSample};
use crate::risk::{RiskConfig, RiskScorer};
use crate::trace::{TraceEntry, TraceLedger};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Everything the engine knows about one tracked agent.
///
/// Created on the agent's first sample and mutated on every subsequent one;
/// never deleted. `is_alert` is a transient annotation - it clears itself on
/// the next evaluation that produces no triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub position: GeoPoint,
    pub timestamp_ms: i64,
    pub zone_id: String,
    pub zone_name: String,
    pub inside_radius: bool,
    /// Minted once on first observation; stable across zone handoffs.
    pub trip_token: Uuid,
    pub risk_score: u8,
    pub predicted_zone_id: Option<String>,
    pub is_alert: bool,
    pub triggers: Vec<TriggerKind>,
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Tunables for the whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub risk: RiskConfig,
    pub distress: DistressConfig,
    /// Dead-reckoning horizon; clamped by the predictor.
    pub horizon_secs: Option<f64>,
}

type AgentSlot = Arc<Mutex<Option<AgentState>>>;

/// Orchestrates the engines over shared state and drives the zone-scoped
/// fan-out.
pub struct TrackingCoordinator<C: Clock = SystemClock> {
    zones: ZoneIndex,
    history: HistoryStore,
    scorer: RiskScorer,
    predictor: HandoffPredictor,
    detector: DistressDetector,
    traces: TraceLedger,
    alerts: AlertLedger,
    bus: ZoneBus,
    /// Per-agent arena: one slot per agent id, never pruned.
    agents: RwLock<HashMap<String, AgentSlot>>,
    /// Zone membership, guarded independently of agent state so joining a
    /// room can race safely with position updates.
    members: RwLock<HashMap<String, HashSet<String>>>,
    clock: C,
}

impl TrackingCoordinator<SystemClock> {
    pub fn new(zones: ZoneIndex, config: CoordinatorConfig) -> Self {
        Self::with_clock(zones, config, SystemClock)
    }
}

impl<C: Clock> TrackingCoordinator<C> {
    pub fn with_clock(zones: ZoneIndex, config: CoordinatorConfig, clock: C) -> Self {
        let bus = ZoneBus::new(zones.zones().iter().map(|z| z.id.as_str()));
        let predictor = config
            .horizon_secs
            .map(HandoffPredictor::new)
            .unwrap_or_default();
        Self {
            zones,
            history: HistoryStore::new(),
            scorer: RiskScorer::new(config.risk),
            predictor,
            detector: DistressDetector::new(config.distress),
            traces: TraceLedger::new(),
            alerts: AlertLedger::new(),
            bus,
            agents: RwLock::new(HashMap::new()),
            members: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Processes one inbound position event and returns the refreshed state.
    pub fn ingest(&self, agent_id: &str, lat: f64, lon: f64) -> Result<AgentState, TrackingError> {
        let slot = self.slot(agent_id);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let now_ms = self.clock.now_ms();
        let point = GeoPoint::new(lat, lon);

        // 1. History append
        self.history
            .append(PositionSample::new(agent_id, point, now_ms));
        let history = self.history.samples(agent_id);

        // 2. Owning zone
        let fix = self.zones.owning_zone(point);

        // 3. Trip token - reuse across the agent's lifetime
        let trip_token = guard
            .as_ref()
            .map(|s| s.trip_token)
            .unwrap_or_else(Uuid::new_v4);

        // 4. Risk score
        let risk_score = self.scorer.score(&history, now_ms);

        // 5. Handoff prediction
        let handoff = self.predictor.predict(&history, &self.zones, &fix.zone.id);

        let mut state = AgentState {
            agent_id: agent_id.to_string(),
            position: point,
            timestamp_ms: now_ms,
            zone_id: fix.zone.id.clone(),
            zone_name: fix.zone.name.clone(),
            inside_radius: fix.inside_radius,
            trip_token,
            risk_score,
            predicted_zone_id: handoff.as_ref().map(|h| h.zone_id.clone()),
            is_alert: false,
            triggers: Vec::new(),
        };

        // 6. Custody trace on zone change (or first observation inside a
        //    station's radius)
        let prev_zone_id = guard.as_ref().map(|s| s.zone_id.clone());
        if prev_zone_id.as_deref() != Some(fix.zone.id.as_str()) {
            self.move_membership(agent_id, prev_zone_id.as_deref(), &fix.zone.id);
        }
        let trace_worthy = match &prev_zone_id {
            Some(prev) => prev != &fix.zone.id,
            None => fix.inside_radius,
        };
        if trace_worthy {
            let chain = self.traces.append(agent_id, fix.zone, now_ms)?;
            if let Some(prev) = &prev_zone_id {
                tracing::info!(agent_id, from = %prev, to = %fix.zone.id, "zone handoff");
                self.bus.publish_zone(
                    prev,
                    ZoneEvent::CabLeft {
                        agent_id: agent_id.to_string(),
                        zone_id: prev.clone(),
                    },
                );
            }
            self.bus.publish_global(ZoneEvent::TraceAppended {
                agent_id: agent_id.to_string(),
                chain,
            });
            self.bus.publish_zone(
                &state.zone_id,
                ZoneEvent::IncomingCab {
                    state: state.clone(),
                    kind: ArrivalKind::Actual,
                    eta_secs: None,
                },
            );
        }

        // 7. Forecast notification to the predicted zone only
        if let Some(h) = &handoff {
            self.bus.publish_zone(
                &h.zone_id,
                ZoneEvent::IncomingCab {
                    state: state.clone(),
                    kind: ArrivalKind::Predicted,
                    eta_secs: Some(h.eta_secs),
                },
            );
        }

        // 8. Distress evaluation
        let trace_chain = self.traces.chain(agent_id);
        let triggers = self
            .detector
            .evaluate(&history, &trace_chain, risk_score, now_ms);
        state.is_alert = !triggers.is_empty();
        state.triggers = triggers.clone();
        *guard = Some(state.clone());

        if triggers.is_empty() {
            self.bus.publish_zone(
                &state.zone_id,
                ZoneEvent::CabUpdate {
                    state: state.clone(),
                },
            );
        } else {
            tracing::warn!(agent_id, ?triggers, risk_score, "distress triggers fired");
            let record = self.alerts.submit_internal(AlertPayload {
                agent_id: agent_id.to_string(),
                trip_token: Some(trip_token),
                location: point,
                severity: Severity::from_risk(risk_score),
                triggers: triggers.clone(),
                note: None,
                timestamp_ms: now_ms,
            })?;
            self.bus
                .publish_global(ZoneEvent::Distress { record, triggers });
        }

        Ok(state)
    }

    /// Externally submitted alert: verified (or counter-signed when the
    /// credential is absent), appended, and broadcast globally.
    pub fn submit_external_alert(
        &self,
        payload: AlertPayload,
        credential: Option<SignedCredential>,
    ) -> Result<AlertRecord, TrackingError> {
        let record = self.alerts.submit_signed(payload, credential)?;
        self.bus.publish_global(ZoneEvent::Distress {
            record: record.clone(),
            triggers: record.payload.triggers.clone(),
        });
        Ok(record)
    }

    /// Joins a zone room: current cab list, geofenced alert backlog, and a
    /// live receiver. `None` for unregistered zones.
    pub fn subscribe(&self, zone_id: &str) -> Option<ZoneSubscription> {
        let events = self.bus.subscribe_zone(zone_id)?;
        let zone = self.zones.get(zone_id)?;
        Some(ZoneSubscription {
            zone_id: zone_id.to_string(),
            cabs: self.zone_cabs(zone_id),
            pending_alerts: self.alerts.pending_for_zone(zone),
            events,
        })
    }

    /// Global receiver: trace broadcasts and distress alerts.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ZoneEvent> {
        self.bus.subscribe_all()
    }

    pub fn zones(&self) -> &[Zone] {
        self.zones.zones()
    }

    /// Current states of the cabs owned by a zone.
    pub fn zone_cabs(&self, zone_id: &str) -> Vec<AgentState> {
        let ids: Vec<String> = self
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(zone_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| self.agent_state(id))
            .collect()
    }

    /// Latest state for an agent, if it has ever been observed.
    pub fn agent_state(&self, agent_id: &str) -> Option<AgentState> {
        let slot = {
            let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
            agents.get(agent_id).cloned()?
        };
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// An agent's custody chain; empty when the agent is unknown.
    pub fn trace_chain(&self, agent_id: &str) -> Vec<TraceEntry> {
        self.traces.chain(agent_id)
    }

    /// The full alert buffer in append order.
    pub fn buffered_alerts(&self) -> Vec<AlertRecord> {
        self.alerts.records()
    }

    pub fn alert_ledger(&self) -> &AlertLedger {
        &self.alerts
    }

    fn slot(&self, agent_id: &str) -> AgentSlot {
        if let Some(slot) = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
        {
            return Arc::clone(slot);
        }
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(agents.entry(agent_id.to_string()).or_default())
    }

    fn move_membership(&self, agent_id: &str, from: Option<&str>, to: &str) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = from {
            if let Some(set) = members.get_mut(prev) {
                set.remove(agent_id);
            }
        }
        members
            .entry(to.to_string())
            .or_default()
            .insert(agent_id.to_string());
    }
}
