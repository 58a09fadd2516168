//! Zone-scoped publish/subscribe fan-out.
//!
//! One broadcast room per registered zone plus one global room. Senders
//! never block: publishing to a room with no subscribers is a no-op, and
//! slow receivers lag rather than backpressure the pipeline.

use crate::alert::AlertRecord;
use crate::coordinator::AgentState;
use crate::distress::TriggerKind;
use crate::trace::TraceEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Per-room buffered events before the oldest are dropped for laggards.
pub const EVENT_BUFFER: usize = 256;

/// Whether an incoming-cab notification reflects a confirmed transition or
/// a dead-reckoned forecast. Both can fire in the same update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrivalKind {
    Actual,
    Predicted,
}

/// Events delivered to zone rooms and the global room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ZoneEvent {
    /// Routine state refresh, scoped to the owning zone.
    CabUpdate { state: AgentState },
    /// The agent's owning zone moved away from this room's zone.
    CabLeft { agent_id: String, zone_id: String },
    /// An agent's custody chain grew; broadcast to all rooms.
    TraceAppended {
        agent_id: String,
        chain: Vec<TraceEntry>,
    },
    /// A cab entered (Actual) or is forecast to enter (Predicted) the zone.
    IncomingCab {
        state: AgentState,
        kind: ArrivalKind,
        eta_secs: Option<u64>,
    },
    /// A distress record landed on the global chain; broadcast everywhere.
    Distress {
        record: AlertRecord,
        triggers: Vec<TriggerKind>,
    },
}

/// What a zone subscriber receives up front, alongside its live receiver.
pub struct ZoneSubscription {
    pub zone_id: String,
    /// Current cab list for the zone at subscribe time.
    pub cabs: Vec<AgentState>,
    /// Store-and-forward: buffered alerts geofenced to this zone.
    pub pending_alerts: Vec<AlertRecord>,
    pub events: broadcast::Receiver<ZoneEvent>,
}

/// Fixed room table: one sender per zone, one global sender.
pub struct ZoneBus {
    rooms: HashMap<String, broadcast::Sender<ZoneEvent>>,
    global: broadcast::Sender<ZoneEvent>,
}

impl ZoneBus {
    pub fn new<'a>(zone_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let rooms = zone_ids
            .into_iter()
            .map(|id| (id.to_string(), broadcast::channel(EVENT_BUFFER).0))
            .collect();
        Self {
            rooms,
            global: broadcast::channel(EVENT_BUFFER).0,
        }
    }

    /// Publishes into a single zone room. Unknown zones and empty rooms are
    /// silently absorbed.
    pub fn publish_zone(&self, zone_id: &str, event: ZoneEvent) {
        if let Some(tx) = self.rooms.get(zone_id) {
            let _ = tx.send(event);
        }
    }

    /// Publishes to every zone room and the global room.
    pub fn publish_global(&self, event: ZoneEvent) {
        for tx in self.rooms.values() {
            let _ = tx.send(event.clone());
        }
        let _ = self.global.send(event);
    }

    pub fn subscribe_zone(&self, zone_id: &str) -> Option<broadcast::Receiver<ZoneEvent>> {
        self.rooms.get(zone_id).map(broadcast::Sender::subscribe)
    }

    /// Global-room receiver: trace broadcasts and distress alerts only.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ZoneEvent> {
        self.global.subscribe()
    }
}
