//! # story-path-kernel
//!
//! Deterministic path enumeration and change categorization for
//! branching-narrative graphs.
//!
//! The kernel answers one question:
//!
//! > Which routes through the story changed in a way a reviewer must see?
//!
//! ## Core Contract
//!
//! 1. Enumerate every route from the start passage, with a bounded cycle budget
//! 2. Fingerprint each route three ways: identity, prose, raw content
//! 3. Categorize each route against the validation cache as NEW, MODIFIED or
//!    UNCHANGED, consulting git history when fingerprints cannot decide
//! 4. Produce the next cache: one entry per reachable route, written atomically
//!
//! ## Architecture
//!
//! ```text
//! StoryGraph → PathEnumerator → StoryPath → Categorizer → CategorizedPath
//!                                               ↑    ↓
//!                         GitEnricher (HistorySource)  ValidationCache
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same graph + same `max_cycles` → identical routes in identical order
//! - Same route → same `route_hash`
//! - Passages are iterated by name, cache entries by route hash

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod canonical;
pub mod fingerprint;
pub mod policy;
pub mod traversal;
pub mod history;
pub mod sources;
pub mod cache;
pub mod categorizer;
pub mod enricher;
pub mod report;
pub mod pipeline;

// Re-exports
pub use types::{
    StoryGraph, Passage, GraphError, RouteHash, Route, PathEnd, StoryPath,
    Category, CategoryMode, FileHistory, EnrichmentIssue, GitMetadata,
};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use fingerprint::{
    route_hash, prose_fingerprint, raw_fingerprint, normalize_prose,
    strip_link_markup, FINGERPRINT_VERSION,
};
pub use policy::PathPolicy;
pub use traversal::{PathEnumerator, Enumeration, TraversalError, TraversalStats};
pub use history::{HistorySource, GitCli, InMemoryHistory, NoHistory};
pub use sources::PassageIndex;
pub use cache::{CacheEntry, CacheError, ValidationCache};
pub use categorizer::{Categorizer, CategorizedPath, Decision, DecisionReason, jaccard_similarity};
pub use enricher::GitEnricher;
pub use report::{RunReport, RunSummary};
pub use pipeline::{CancellationFlag, PathPipeline, PipelineError, RunOutcome};

/// Schema version for persisted and reported types.
/// Increment on breaking changes to any schema type.
pub const STORY_PATH_SCHEMA_VERSION: &str = "1.0.0";

/// Default policy version identifier.
pub const DEFAULT_POLICY_VERSION: &str = "path_policy_v1";
