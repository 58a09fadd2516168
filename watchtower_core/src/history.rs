//! Per-agent bounded position history - the shared substrate every
//! analytics engine reads.

use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

/// Samples retained per agent before FIFO eviction kicks in.
pub const HISTORY_CAPACITY: usize = 20;

/// A single observed position. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSample {
    pub agent_id: String,
    pub point: GeoPoint,
    /// Monotonic milliseconds, stamped by the coordinator's clock.
    pub timestamp_ms: i64,
}

impl PositionSample {
    pub fn new(agent_id: impl Into<String>, point: GeoPoint, timestamp_ms: i64) -> Self {
        Self {
            agent_id: agent_id.into(),
            point,
            timestamp_ms,
        }
    }
}

/// Capacity-bounded ring of recent positions, keyed by agent id.
///
/// Pure storage: appending never triggers analytics. Reads are total -
/// unknown agents yield an empty sequence, not an error.
pub struct HistoryStore {
    rings: RwLock<HashMap<String, VecDeque<PositionSample>>>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rings: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Appends a sample, evicting the oldest when the ring is full.
    ///
    /// Timestamps are clamped forward so each ring stays non-decreasing even
    /// if a caller stamps a regressive clock reading.
    pub fn append(&self, sample: PositionSample) {
        let mut rings = self.rings.write().unwrap_or_else(PoisonError::into_inner);
        let ring = rings.entry(sample.agent_id.clone()).or_default();

        let mut sample = sample;
        if let Some(last) = ring.back() {
            if sample.timestamp_ms < last.timestamp_ms {
                sample.timestamp_ms = last.timestamp_ms;
            }
        }

        ring.push_back(sample);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Ordered snapshot of an agent's ring; empty for unknown agents.
    pub fn samples(&self, agent_id: &str) -> Vec<PositionSample> {
        self.rings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, agent_id: &str) -> usize {
        self.rings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, agent_id: &str) -> bool {
        self.len(agent_id) == 0
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(agent: &str, lat: f64, ts: i64) -> PositionSample {
        PositionSample::new(agent, GeoPoint::new(lat, 77.0), ts)
    }

    #[test]
    fn test_unknown_agent_yields_empty() {
        let store = HistoryStore::new();
        assert!(store.samples("ghost").is_empty());
        assert_eq!(store.len("ghost"), 0);
    }

    #[test]
    fn test_append_preserves_order() {
        let store = HistoryStore::new();
        for i in 0..5 {
            store.append(sample("cab-1", 28.0 + i as f64 * 0.01, 1000 * i));
        }
        let samples = store.samples("cab-1");
        assert_eq!(samples.len(), 5);
        for pair in samples.windows(2) {
            assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
        }
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let store = HistoryStore::new();
        for i in 0..(HISTORY_CAPACITY as i64 + 5) {
            store.append(sample("cab-1", 28.0, i * 1000));
        }
        let samples = store.samples("cab-1");
        assert_eq!(samples.len(), HISTORY_CAPACITY);
        // The first five were evicted
        assert_eq!(samples[0].timestamp_ms, 5000);
    }

    #[test]
    fn test_regressive_timestamp_clamped() {
        let store = HistoryStore::new();
        store.append(sample("cab-1", 28.0, 10_000));
        store.append(sample("cab-1", 28.1, 4_000));
        let samples = store.samples("cab-1");
        assert_eq!(samples[1].timestamp_ms, 10_000);
    }

    #[test]
    fn test_agents_are_independent() {
        let store = HistoryStore::new();
        store.append(sample("cab-1", 28.0, 1000));
        store.append(sample("cab-2", 29.0, 1000));
        assert_eq!(store.len("cab-1"), 1);
        assert_eq!(store.len("cab-2"), 1);
    }
}
