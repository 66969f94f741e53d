//! The categorization pipeline.
//!
//! ```text
//! StoryGraph ─► PathEnumerator ─► StoryPath (fingerprints)
//!                                      │
//!              ValidationCache ─► Categorizer (phases 1–2)
//!                                      │
//!                  HistorySource ─► GitEnricher (+ phase-3 prose checks)
//!                                      │
//!                                 Categorizer ─► CategorizedPath + next cache
//! ```
//!
//! The input cache is only read. The next cache is returned in the
//! [`RunOutcome`]; nothing touches disk until the caller saves it, and a
//! cancelled run never produces one.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cache::{CacheError, ValidationCache};
use crate::categorizer::{CategorizedPath, Categorizer};
use crate::enricher::GitEnricher;
use crate::history::HistorySource;
use crate::policy::PathPolicy;
use crate::report::{RunReport, RunSummary};
use crate::sources::PassageIndex;
use crate::traversal::{PathEnumerator, TraversalError};
use crate::types::{CategoryMode, GraphError, StoryGraph, StoryPath};

/// Shared flag a parent can set to stop a run between paths.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create an untripped flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Errors that stop a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The story graph could not be loaded.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The story graph cannot be traversed.
    #[error(transparent)]
    Traversal(#[from] TraversalError),
    /// Policy parameters could not be hashed.
    #[error("Failed to hash policy parameters: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The next cache could not be written.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The run was cancelled.
    #[error("Run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Whether the error stems from bad input rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Graph(_) | Self::Traversal(_))
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Every enumerated path, categorized, in traversal order.
    pub paths: Vec<CategorizedPath>,
    /// Cache to persist: one entry per reachable route.
    pub cache: ValidationCache,
    /// Counts over the run.
    pub summary: RunSummary,
    /// Identifier of the graph state.
    pub snapshot_id: String,
    /// Hash of the policy parameters.
    pub params_hash: String,
}

impl RunOutcome {
    /// Report selecting paths by `mode`.
    pub fn report(&self, mode: CategoryMode) -> RunReport<'_> {
        RunReport {
            snapshot_id: &self.snapshot_id,
            params_hash: &self.params_hash,
            mode,
            summary: self.summary,
            paths: self
                .paths
                .iter()
                .filter(|p| mode.includes(p.category))
                .collect(),
        }
    }

    /// Stamp and atomically write the next cache.
    pub fn save_cache(&mut self, path: &Path, now: DateTime<Utc>) -> Result<(), CacheError> {
        self.cache.touch(now);
        self.cache.save_atomic(path)?;
        info!(path = %path.display(), entries = self.cache.len(), "validation cache written");
        Ok(())
    }
}

/// Enumerates, enriches and categorizes every path of a story.
pub struct PathPipeline<H: HistorySource + 'static> {
    enricher: GitEnricher<H>,
    policy: PathPolicy,
    passage_files: BTreeMap<String, String>,
}

impl<H: HistorySource + 'static> PathPipeline<H> {
    /// Create a pipeline.
    pub fn new(source: Arc<H>, policy: PathPolicy, index: PassageIndex) -> Self {
        Self {
            enricher: GitEnricher::new(source, policy.git_concurrency),
            passage_files: index.as_map().clone(),
            policy,
        }
    }

    /// The policy in effect.
    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Run against `graph` and the loaded `cache`.
    pub async fn run(
        &self,
        graph: &StoryGraph,
        cache: &ValidationCache,
        cancel: &CancellationFlag,
    ) -> Result<RunOutcome, PipelineError> {
        let params_hash = self.policy.params_hash()?;
        let snapshot_id = graph.snapshot_id();

        let enumeration = PathEnumerator::new(self.policy.max_cycles).enumerate(graph)?;
        info!(
            routes = enumeration.routes.len(),
            snapshot_id = %snapshot_id,
            cached = cache.len(),
            "enumerated story paths"
        );

        let mut paths: Vec<StoryPath> = Vec::with_capacity(enumeration.routes.len());
        for route in enumeration.routes {
            cancel.check()?;
            paths.push(StoryPath::from_route(route, graph));
        }

        let categorizer = Categorizer::new(cache, self.policy.similarity_threshold);
        let baselines: Vec<_> = paths
            .iter()
            .map(|path| match categorizer.pre_decide(path) {
                Some(_) => None,
                None => categorizer.baseline(path),
            })
            .collect();
        debug!(
            history_checks = baselines.iter().filter(|b| b.is_some()).count(),
            "phase-3 baselines collected"
        );

        cancel.check()?;
        let metadata = self
            .enricher
            .enrich_all(&paths, &self.passage_files, &baselines)
            .await;
        cancel.check()?;

        let mut categorized = Vec::with_capacity(paths.len());
        for (path, git) in paths.into_iter().zip(metadata) {
            cancel.check()?;
            categorized.push(categorizer.categorize(path, git));
        }

        let (next, stale_dropped) = categorizer.build_cache(&categorized);
        let summary = RunSummary::tally(&categorized, enumeration.stats, stale_dropped);
        summary.log();

        Ok(RunOutcome {
            paths: categorized,
            cache: next,
            summary,
            snapshot_id,
            params_hash,
        })
    }
}
