//! The "CUSTODY" Engine (part 2) - the single global alert chain.
//!
//! Every emergency record - externally submitted and signed, or minted
//! internally from a distress trigger - lands on one hash-linked,
//! append-order-total chain. Signature verification happens before any
//! chain mutation; a rejected submission leaves no state behind.

use crate::chain::{link_digest, verify_chain, ChainError, HashLinked, GENESIS_HASH};
use crate::distress::{Severity, TriggerKind};
use crate::geo::{haversine_km, GeoPoint, Zone};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AlertError {
    /// The declared signature does not verify against the payload bytes.
    /// The submission is rejected before any chain mutation.
    #[error("alert signature does not match payload")]
    InvalidSignature,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Who attested the record: the detector pipeline or an external submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSource {
    /// Minted by the distress detector; signed by the ledger's own keypair.
    Auto,
    /// Submitted from outside the engine.
    Manual,
}

/// The signed portion of an alert submission. Signatures cover exactly
/// these fields in canonical JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub agent_id: String,
    pub trip_token: Option<Uuid>,
    pub location: GeoPoint,
    pub severity: Severity,
    pub triggers: Vec<TriggerKind>,
    pub note: Option<String>,
    pub timestamp_ms: i64,
}

impl AlertPayload {
    /// Canonical byte encoding used for both signing and verification.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ChainError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An external submitter's signature over the payload bytes.
#[derive(Debug, Clone)]
pub struct SignedCredential {
    pub signature: Signature,
    pub public_key: VerifyingKey,
}

impl SignedCredential {
    /// Signs a payload the way external submitters are expected to.
    pub fn sign(payload: &AlertPayload, key: &SigningKey) -> Result<Self, ChainError> {
        let bytes = payload.canonical_bytes()?;
        Ok(Self {
            signature: key.sign(&bytes),
            public_key: key.verifying_key(),
        })
    }
}

/// One record on the global alert chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub payload: AlertPayload,
    pub source: AlertSource,
    pub previous_hash: String,
    pub hash: String,
    pub signature: Signature,
    pub public_key: VerifyingKey,
}

#[derive(Serialize)]
struct AlertDigest<'a> {
    id: &'a Uuid,
    payload: &'a AlertPayload,
    source: AlertSource,
    signature: &'a Signature,
    public_key: &'a VerifyingKey,
}

impl AlertRecord {
    fn digest_fields(&self) -> AlertDigest<'_> {
        AlertDigest {
            id: &self.id,
            payload: &self.payload,
            source: self.source,
            signature: &self.signature,
            public_key: &self.public_key,
        }
    }

    /// Whether the stored signature verifies against the payload bytes.
    pub fn signature_valid(&self) -> bool {
        match self.payload.canonical_bytes() {
            Ok(bytes) => self.public_key.verify(&bytes, &self.signature).is_ok(),
            Err(_) => false,
        }
    }
}

impl HashLinked for AlertRecord {
    fn hash(&self) -> &str {
        &self.hash
    }

    fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    fn recompute_hash(&self) -> Result<String, ChainError> {
        link_digest(&self.digest_fields(), &self.previous_hash)
    }
}

/// The global alert ledger: verification, system attestation, one
/// exclusive append lock, and geofenced replay of the buffer.
pub struct AlertLedger {
    /// Exclusive append lock - the one place parallelism is traded for a
    /// total order, so `previous_hash` never reads a stale tail.
    records: Mutex<Vec<AlertRecord>>,
    signing_key: SigningKey,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::with_key(SigningKey::generate(&mut OsRng))
    }

    /// Uses a caller-provided system keypair (deterministic tests, key
    /// management done elsewhere).
    pub fn with_key(signing_key: SigningKey) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            signing_key,
        }
    }

    /// The key external consumers can use to check system-attested records.
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Externally submitted alert. A present credential is verified against
    /// the payload bytes and rejected outright on mismatch. An absent
    /// credential is counter-signed by the ledger's own keypair - the demo
    /// trust boundary; integrations that need real provenance guarantees
    /// must require a credential.
    pub fn submit_signed(
        &self,
        payload: AlertPayload,
        credential: Option<SignedCredential>,
    ) -> Result<AlertRecord, AlertError> {
        let bytes = payload.canonical_bytes()?;
        let (signature, public_key) = match credential {
            Some(credential) => {
                credential
                    .public_key
                    .verify(&bytes, &credential.signature)
                    .map_err(|_| AlertError::InvalidSignature)?;
                (credential.signature, credential.public_key)
            }
            None => (self.signing_key.sign(&bytes), self.signing_key.verifying_key()),
        };
        self.append(payload, AlertSource::Manual, signature, public_key)
    }

    /// Detector-originated alert, attested by the ledger's own keypair.
    pub fn submit_internal(&self, payload: AlertPayload) -> Result<AlertRecord, AlertError> {
        let bytes = payload.canonical_bytes()?;
        let signature = self.signing_key.sign(&bytes);
        let public_key = self.signing_key.verifying_key();
        self.append(payload, AlertSource::Auto, signature, public_key)
    }

    fn append(
        &self,
        payload: AlertPayload,
        source: AlertSource,
        signature: Signature,
        public_key: VerifyingKey,
    ) -> Result<AlertRecord, AlertError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let previous_hash = records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let id = Uuid::new_v4();
        let hash = link_digest(
            &AlertDigest {
                id: &id,
                payload: &payload,
                source,
                signature: &signature,
                public_key: &public_key,
            },
            &previous_hash,
        )?;

        let record = AlertRecord {
            id,
            payload,
            source,
            previous_hash,
            hash,
            signature,
            public_key,
        };
        records.push(record.clone());
        tracing::info!(
            alert_id = %record.id,
            agent_id = %record.payload.agent_id,
            source = ?record.source,
            len = records.len(),
            "alert appended"
        );
        Ok(record)
    }

    /// Snapshot of the full buffer in append order.
    pub fn records(&self) -> Vec<AlertRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered records whose location falls inside the zone's containment
    /// radius - the store-and-forward set replayed to late subscribers.
    pub fn pending_for_zone(&self, zone: &Zone) -> Vec<AlertRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| haversine_km(r.payload.location, zone.center) <= zone.radius_km)
            .cloned()
            .collect()
    }

    /// Full-chain linkage and digest verification.
    pub fn verify(&self) -> bool {
        verify_chain(
            &self
                .records
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl Default for AlertLedger {
    fn default() -> Self {
        Self::new()
    }
}
