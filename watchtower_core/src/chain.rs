//! Append-with-link hash chaining, shared by the custody trace and the
//! global alert ledger.
//!
//! Linking is enforced in exactly one place: an entry's hash is the SHA-256
//! digest of its canonical-JSON fields concatenated with the previous
//! entry's hash (or the genesis value for the first entry). Re-deriving the
//! digest from the stored fields detects tampering anywhere in the chain.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Previous-hash value carried by the first entry of every chain.
pub const GENESIS_HASH: &str = "0";

#[derive(Debug, Error)]
pub enum ChainError {
    /// Digest-input serialization failed. Treated as fatal - it does not
    /// occur for well-formed records.
    #[error("digest input serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Computes the linked digest for a new entry: SHA-256 over the entry's
/// canonical JSON fields followed by the previous hash, hex-encoded.
pub fn link_digest<T: Serialize>(fields: &T, previous_hash: &str) -> Result<String, ChainError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(fields)?);
    hasher.update(previous_hash.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// An entry that participates in a hash chain.
pub trait HashLinked {
    fn hash(&self) -> &str;
    fn previous_hash(&self) -> &str;
    /// Re-derives the digest from the stored fields.
    fn recompute_hash(&self) -> Result<String, ChainError>;
}

/// Verifies linkage and digests across an entire chain: every entry's
/// `previous_hash` must equal its predecessor's `hash` (genesis for the
/// first), and every stored hash must match its recomputed digest.
pub fn verify_chain<E: HashLinked>(entries: &[E]) -> bool {
    let mut expected_prev = GENESIS_HASH;
    for entry in entries {
        if entry.previous_hash() != expected_prev {
            return false;
        }
        match entry.recompute_hash() {
            Ok(digest) if digest == entry.hash() => {}
            _ => return false,
        }
        expected_prev = entry.hash();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Fields<'a> {
        label: &'a str,
        value: u32,
    }

    struct Entry {
        label: String,
        value: u32,
        previous_hash: String,
        hash: String,
    }

    impl HashLinked for Entry {
        fn hash(&self) -> &str {
            &self.hash
        }
        fn previous_hash(&self) -> &str {
            &self.previous_hash
        }
        fn recompute_hash(&self) -> Result<String, ChainError> {
            link_digest(
                &Fields {
                    label: &self.label,
                    value: self.value,
                },
                &self.previous_hash,
            )
        }
    }

    fn append(chain: &mut Vec<Entry>, label: &str, value: u32) {
        let previous_hash = chain
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let hash = link_digest(&Fields { label, value }, &previous_hash).unwrap();
        chain.push(Entry {
            label: label.to_string(),
            value,
            previous_hash,
            hash,
        });
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = link_digest(&Fields { label: "x", value: 1 }, GENESIS_HASH).unwrap();
        let b = link_digest(&Fields { label: "x", value: 1 }, GENESIS_HASH).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_digest_depends_on_previous_hash() {
        let a = link_digest(&Fields { label: "x", value: 1 }, GENESIS_HASH).unwrap();
        let b = link_digest(&Fields { label: "x", value: 1 }, &a).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_valid_chain_verifies() {
        let mut chain = Vec::new();
        append(&mut chain, "a", 1);
        append(&mut chain, "b", 2);
        append(&mut chain, "c", 3);
        assert!(verify_chain(&chain));
        assert_eq!(chain[0].previous_hash, GENESIS_HASH);
        assert_eq!(chain[1].previous_hash, chain[0].hash);
    }

    #[test]
    fn test_field_tampering_detected() {
        let mut chain = Vec::new();
        append(&mut chain, "a", 1);
        append(&mut chain, "b", 2);
        chain[1].value = 99;
        assert!(!verify_chain(&chain));
    }

    #[test]
    fn test_link_tampering_detected() {
        let mut chain = Vec::new();
        append(&mut chain, "a", 1);
        append(&mut chain, "b", 2);
        chain[1].previous_hash = GENESIS_HASH.to_string();
        assert!(!verify_chain(&chain));
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let chain: Vec<Entry> = Vec::new();
        assert!(verify_chain(&chain));
    }
}
