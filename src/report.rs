//! Run summary and report.

use serde::Serialize;
use tracing::info;

use crate::categorizer::CategorizedPath;
use crate::traversal::TraversalStats;
use crate::types::{Category, CategoryMode};

/// Counts describing one run. Always emitted, even when anomalies occurred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Paths enumerated.
    pub total: usize,
    /// Paths categorized NEW.
    pub new: usize,
    /// Paths categorized MODIFIED.
    pub modified: usize,
    /// Paths categorized UNCHANGED.
    pub unchanged: usize,
    /// Paths still carrying an author's validation.
    pub validated: usize,
    /// Paths whose git enrichment was partial or absent.
    pub degraded: usize,
    /// Links to passages that do not exist.
    pub dangling_links: usize,
    /// Edges pruned by the cycle budget.
    pub cycle_prunes: usize,
    /// Routes ended by the cycle budget.
    pub cutoff_paths: usize,
    /// Cache entries dropped because their route is gone.
    pub stale_dropped: usize,
}

impl RunSummary {
    /// Tally categorized paths and traversal anomalies.
    pub fn tally(paths: &[CategorizedPath], stats: TraversalStats, stale_dropped: usize) -> Self {
        let mut summary = Self {
            total: paths.len(),
            dangling_links: stats.dangling_links,
            cycle_prunes: stats.cycle_prunes,
            cutoff_paths: stats.cutoff_paths,
            stale_dropped,
            ..Default::default()
        };
        for p in paths {
            match p.category {
                Category::New => summary.new += 1,
                Category::Modified => summary.modified += 1,
                Category::Unchanged => summary.unchanged += 1,
            }
            if p.validated {
                summary.validated += 1;
            }
            if p.git_metadata.is_degraded() {
                summary.degraded += 1;
            }
        }
        summary
    }

    /// Paths that need review.
    pub fn needs_review(&self) -> usize {
        self.new + self.modified
    }

    /// Log the summary.
    pub fn log(&self) {
        info!(
            total = self.total,
            new = self.new,
            modified = self.modified,
            unchanged = self.unchanged,
            validated = self.validated,
            degraded = self.degraded,
            dangling_links = self.dangling_links,
            cycle_prunes = self.cycle_prunes,
            stale_dropped = self.stale_dropped,
            "categorization complete"
        );
    }
}

/// What downstream consumers receive.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    /// Identifier of the graph state that was enumerated.
    pub snapshot_id: &'a str,
    /// Hash of the policy parameters used.
    pub params_hash: &'a str,
    /// Mode that selected `paths`.
    pub mode: CategoryMode,
    /// Counts over every path, not only the selected ones.
    pub summary: RunSummary,
    /// Paths selected by `mode`.
    pub paths: Vec<&'a CategorizedPath>,
}
