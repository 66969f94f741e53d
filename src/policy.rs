//! PathPolicy v1: traversal budget, similarity threshold and git limits.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! Floats are quantized to integers before hashing so that the
//! `params_hash` recorded with a run is stable across platforms. The
//! quantization factor is 1e6 (multiply by 1,000,000 and round to i64).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::DEFAULT_POLICY_VERSION;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Upper bound on concurrent git subprocesses.
pub const MAX_GIT_CONCURRENCY: usize = 8;

/// Quantize a float to an i64 for deterministic hashing.
fn quantize_float(value: f32) -> i64 {
    ((value as f64) * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

/// Quantized policy parameters for deterministic hashing.
#[derive(Debug, Clone, Serialize)]
struct QuantizedPolicyParams {
    version: String,
    max_cycles: usize,
    similarity_threshold: i64,
    git_timeout_ms: u64,
    git_concurrency: usize,
}

/// Path policy version 1.
///
/// ## Parameters
///
/// - `max_cycles`: Revisits allowed per passage on one route (1 = a passage
///   may appear at most twice)
/// - `similarity_threshold`: Minimum Jaccard similarity between passage sets
///   for a prose match to count as a restructuring
/// - `git_timeout_ms`: Per-query timeout for git subprocesses
/// - `git_concurrency`: Concurrent git subprocesses (1..=8)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPolicy {
    /// Policy version identifier.
    pub version: String,
    /// Revisits allowed per passage on a single route.
    pub max_cycles: usize,
    /// Jaccard threshold for structural-change matches.
    pub similarity_threshold: f32,
    /// Timeout for each git query, in milliseconds.
    pub git_timeout_ms: u64,
    /// Maximum concurrent git queries.
    pub git_concurrency: usize,
}

impl PathPolicy {
    /// Create a new policy with custom parameters.
    pub fn new(
        max_cycles: usize,
        similarity_threshold: f32,
        git_timeout_ms: u64,
        git_concurrency: usize,
    ) -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            max_cycles,
            similarity_threshold: similarity_threshold.clamp(0.0, 1.0),
            git_timeout_ms: git_timeout_ms.max(1),
            git_concurrency: git_concurrency.clamp(1, MAX_GIT_CONCURRENCY),
        }
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Replace the cycle budget.
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Per-query git timeout.
    pub fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.git_timeout_ms)
    }

    /// Compute a hash of the policy parameters.
    ///
    /// Uses quantized float representation to ensure cross-platform consistency.
    pub fn params_hash(&self) -> Result<String, serde_json::Error> {
        canonical_hash_hex(&self.to_quantized())
    }

    fn to_quantized(&self) -> QuantizedPolicyParams {
        QuantizedPolicyParams {
            version: self.version.clone(),
            max_cycles: self.max_cycles,
            similarity_threshold: quantize_float(self.similarity_threshold),
            git_timeout_ms: self.git_timeout_ms,
            git_concurrency: self.git_concurrency,
        }
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            max_cycles: 1,
            similarity_threshold: 0.7,
            git_timeout_ms: 5_000,
            git_concurrency: 4,
        }
    }
}
