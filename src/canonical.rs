//! Canonical serialization for deterministic identity hashes.
//!
//! Used for run-level identifiers (graph snapshot id, policy params hash),
//! never for path identity or content fingerprints, which live in
//! [`crate::fingerprint`].
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: Vectors serialize in index order
//! - No HashMap allowed: Use BTreeMap for maps in hashed data
//! - No floats: quantize to integers before hashing

use serde::Serialize;
use xxhash_rust::xxh64::{xxh64, Xxh64};

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

/// Streaming xxh64 fold over length-prefixed byte fields.
///
/// Each field is prefixed with its length so that `("ab", "c")` and
/// `("a", "bc")` fold to different values.
pub struct CanonicalFold {
    hasher: Xxh64,
}

impl CanonicalFold {
    /// Start a new fold tagged with a schema version.
    pub fn new(schema_version: &str) -> Self {
        let mut fold = Self { hasher: Xxh64::new(0) };
        fold.field(schema_version.as_bytes());
        fold
    }

    /// Fold in one field.
    pub fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Finish and return a 16-character hex digest.
    pub fn finish_hex(&self) -> String {
        format!("{:016x}", self.hasher.digest())
    }
}
