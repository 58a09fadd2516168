//! WatchTower Core - Jurisdiction Tracking & Tamper-Evident Custody Engine
//!
//! This library solves three problems for fleet-safety deployments:
//! 1. **Who holds the cab?** Nearest-station assignment, dead-reckoned
//!    handoff forecasts, and zone-scoped fan-out
//! 2. **Is the trip going wrong?** Composite anomaly scoring plus discrete
//!    distress triggers over bounded position history
//! 3. **Can the record be trusted?** Hash-chained custody traces, a single
//!    globally ordered alert chain, and Ed25519 provenance on every alert

pub mod alert;
pub mod bus;
pub mod chain;
pub mod clock;
pub mod coordinator;
pub mod distress;
pub mod geo;
pub mod handoff;
pub mod history;
pub mod risk;
pub mod trace;

// Re-export key types for convenience
pub use alert::{AlertError, AlertLedger, AlertPayload, AlertRecord, AlertSource, SignedCredential};
pub use bus::{ArrivalKind, ZoneEvent, ZoneSubscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{AgentState, CoordinatorConfig, TrackingCoordinator, TrackingError};
pub use distress::{DistressConfig, DistressDetector, Severity, TriggerKind};
pub use geo::{BoundingBox, GeoError, GeoPoint, Zone, ZoneIndex, ZoneMetadata};
pub use handoff::{Handoff, HandoffPredictor};
pub use history::{HistoryStore, PositionSample, HISTORY_CAPACITY};
pub use risk::{RiskConfig, RiskScorer};
pub use trace::{TraceEntry, TraceLedger};
