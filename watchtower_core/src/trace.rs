//! The "CUSTODY" Engine (part 1) - per-agent zone-transition trace chains.
//!
//! One append-only hash chain per agent, extended exactly when the agent's
//! owning zone changes. The chain is the evidentiary record of which
//! jurisdiction held the agent and when.

use crate::chain::{link_digest, ChainError, HashLinked, GENESIS_HASH};
use crate::geo::Zone;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// One zone transition in an agent's custody chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub zone_id: String,
    pub zone_name: String,
    pub timestamp_ms: i64,
    pub previous_hash: String,
    pub hash: String,
}

/// The digest covers exactly the business fields; the previous hash is
/// mixed in by the chain primitive.
#[derive(Serialize)]
struct TraceDigest<'a> {
    zone_id: &'a str,
    zone_name: &'a str,
    timestamp_ms: i64,
}

impl HashLinked for TraceEntry {
    fn hash(&self) -> &str {
        &self.hash
    }

    fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    fn recompute_hash(&self) -> Result<String, ChainError> {
        link_digest(
            &TraceDigest {
                zone_id: &self.zone_id,
                zone_name: &self.zone_name,
                timestamp_ms: self.timestamp_ms,
            },
            &self.previous_hash,
        )
    }
}

/// Per-agent append-only trace chains.
///
/// The coordinator serializes appends per agent; reads are total and return
/// empty chains for unknown agents.
pub struct TraceLedger {
    chains: RwLock<HashMap<String, Vec<TraceEntry>>>,
}

impl TraceLedger {
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a transition into `zone` and returns the full updated chain.
    pub fn append(
        &self,
        agent_id: &str,
        zone: &Zone,
        timestamp_ms: i64,
    ) -> Result<Vec<TraceEntry>, ChainError> {
        let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);
        let chain = chains.entry(agent_id.to_string()).or_default();

        let previous_hash = chain
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let hash = link_digest(
            &TraceDigest {
                zone_id: &zone.id,
                zone_name: &zone.name,
                timestamp_ms,
            },
            &previous_hash,
        )?;

        chain.push(TraceEntry {
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            timestamp_ms,
            previous_hash,
            hash,
        });
        tracing::debug!(agent_id, zone_id = %zone.id, len = chain.len(), "trace appended");
        Ok(chain.clone())
    }

    /// Snapshot of an agent's chain; empty for unknown agents.
    pub fn chain(&self, agent_id: &str) -> Vec<TraceEntry> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, agent_id: &str) -> usize {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, agent_id: &str) -> bool {
        self.len(agent_id) == 0
    }
}

impl Default for TraceLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::verify_chain;

    fn zone(id: &str, name: &str) -> Zone {
        Zone::new(id, name, 28.6, 77.2)
    }

    #[test]
    fn test_first_entry_links_to_genesis() {
        let ledger = TraceLedger::new();
        let chain = ledger.append("cab-1", &zone("st-01", "Central"), 1000).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].previous_hash, GENESIS_HASH);
    }

    #[test]
    fn test_appends_link_and_verify() {
        let ledger = TraceLedger::new();
        ledger.append("cab-1", &zone("st-01", "Central"), 1000).unwrap();
        ledger.append("cab-1", &zone("st-02", "North"), 2000).unwrap();
        let chain = ledger.append("cab-1", &zone("st-01", "Central"), 3000).unwrap();

        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].previous_hash, chain[0].hash);
        assert_eq!(chain[2].previous_hash, chain[1].hash);
        assert!(verify_chain(&chain));
    }

    #[test]
    fn test_tampered_entry_fails_verification() {
        let ledger = TraceLedger::new();
        ledger.append("cab-1", &zone("st-01", "Central"), 1000).unwrap();
        let mut chain = ledger.append("cab-1", &zone("st-02", "North"), 2000).unwrap();
        chain[0].zone_name = "Elsewhere".to_string();
        assert!(!verify_chain(&chain));
    }

    #[test]
    fn test_chains_are_per_agent() {
        let ledger = TraceLedger::new();
        ledger.append("cab-1", &zone("st-01", "Central"), 1000).unwrap();
        assert_eq!(ledger.len("cab-1"), 1);
        assert_eq!(ledger.len("cab-2"), 0);
        assert!(ledger.chain("cab-2").is_empty());
    }
}
