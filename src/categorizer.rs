//! Path categorization against the validation cache.
//!
//! ## Decision Procedure
//!
//! For each path, looked up by `route_hash`:
//!
//! 1. The entry's raw fingerprint equals the path's → **UNCHANGED** (a
//!    missing raw fingerprint never matches).
//! 2. Some cached entry has the same prose fingerprint and a passage set
//!    with Jaccard similarity ≥ threshold → **MODIFIED** (same prose, new
//!    structure). This applies to unseen route hashes too; an unseen route
//!    without such a match is **NEW**.
//! 3. Otherwise ask version control whether any file on the route gained
//!    prose since the entry's `commit_date`: yes → **NEW**, no →
//!    **MODIFIED**, unknown → **MODIFIED**.
//!
//! Only UNCHANGED carries the author's `validated` flag forward; anything
//! else must be reviewed again.
//!
//! ## Known Limitation
//!
//! Jaccard similarity is computed over unordered passage-name sets, so two
//! routes visiting the same passages in a different order are
//! indistinguishable in phase 2.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, ValidationCache};
use crate::types::{format_timestamp, Category, GitMetadata, RouteHash, StoryPath};

/// Jaccard similarity: |A ∩ B| / |A ∪ B|. Two empty sets are identical.
pub fn jaccard_similarity<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    shared as f32 / union as f32
}

/// Why a category was assigned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// The route hash is not in the cache.
    NotInCache,
    /// Route and raw fingerprint both match the cached entry.
    ExactMatch,
    /// A cached route with the same prose overlaps this one enough.
    LinksOnlyChange {
        /// Route hash of the matched cache entry.
        matched: RouteHash,
        /// Passage-set Jaccard similarity with the match.
        similarity: f32,
    },
    /// History shows new prose since the cached commit.
    ProseChanged,
    /// History shows only link edits since the cached commit.
    NoProseChange,
    /// History could not decide; treated conservatively.
    HistoryUnavailable,
}

/// A category together with its reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Assigned category.
    pub category: Category,
    /// Why.
    pub reason: DecisionReason,
}

impl Decision {
    fn new(category: Category, reason: DecisionReason) -> Self {
        Self { category, reason }
    }
}

/// A path with its category, ready for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorizedPath {
    /// The fingerprinted path.
    #[serde(flatten)]
    pub path: StoryPath,
    /// Assigned category.
    pub category: Category,
    /// Review flag after this run.
    pub validated: bool,
    /// Version-control metadata.
    pub git_metadata: GitMetadata,
    /// Why the category was assigned.
    pub reason: DecisionReason,
}

/// Phase-2 candidate derived from a cache entry.
struct Candidate<'c> {
    hash: &'c RouteHash,
    passages: BTreeSet<&'c str>,
}

/// Categorizes paths against one loaded cache.
pub struct Categorizer<'c> {
    cache: &'c ValidationCache,
    threshold: f32,
    by_prose: BTreeMap<&'c str, Vec<Candidate<'c>>>,
}

impl<'c> Categorizer<'c> {
    /// Index `cache` for lookups. `threshold` is the phase-2 Jaccard cutoff.
    pub fn new(cache: &'c ValidationCache, threshold: f32) -> Self {
        let mut by_prose: BTreeMap<&'c str, Vec<Candidate<'c>>> = BTreeMap::new();
        for (hash, entry) in cache.entries() {
            let Some(prose) = entry.prose_fingerprint.as_deref() else {
                continue;
            };
            by_prose.entry(prose).or_default().push(Candidate {
                hash,
                passages: entry.passages().into_iter().collect(),
            });
        }
        Self {
            cache,
            threshold,
            by_prose,
        }
    }

    /// The cache being compared against.
    pub fn cache(&self) -> &'c ValidationCache {
        self.cache
    }

    /// Baseline for the phase-3 history check, if one applies.
    pub fn baseline(&self, path: &StoryPath) -> Option<DateTime<Utc>> {
        self.cache
            .get(&path.route_hash)
            .and_then(CacheEntry::commit_timestamp)
    }

    /// Phases 1 and 2. `None` means the path needs history (phase 3).
    ///
    /// A route hash the cache has never seen is still matched by prose
    /// against other cached routes first: a renamed, split or inserted
    /// passage yields a new route hash over the same prose, which is
    /// MODIFIED. Only without such a match is the route NEW.
    pub fn pre_decide(&self, path: &StoryPath) -> Option<Decision> {
        let entry = self.cache.get(&path.route_hash);

        if let Some(entry) = entry {
            if entry.raw_fingerprint.as_deref() == Some(path.raw_fingerprint.as_str()) {
                return Some(Decision::new(Category::Unchanged, DecisionReason::ExactMatch));
            }
        }

        let restructured = self.best_prose_match(path).map(|(matched, similarity)| {
            Decision::new(
                Category::Modified,
                DecisionReason::LinksOnlyChange {
                    matched: matched.clone(),
                    similarity,
                },
            )
        });

        match (entry, restructured) {
            (_, Some(decision)) => Some(decision),
            (None, None) => Some(Decision::new(Category::New, DecisionReason::NotInCache)),
            (Some(_), None) => None,
        }
    }

    /// Full decision, using `git` for phase 3.
    pub fn decide(&self, path: &StoryPath, git: &GitMetadata) -> Decision {
        if let Some(decision) = self.pre_decide(path) {
            return decision;
        }
        match git.prose_change {
            Some(true) => Decision::new(Category::New, DecisionReason::ProseChanged),
            Some(false) => Decision::new(Category::Modified, DecisionReason::NoProseChange),
            None => Decision::new(Category::Modified, DecisionReason::HistoryUnavailable),
        }
    }

    /// Decide and attach the resulting review flag.
    pub fn categorize(&self, path: StoryPath, git_metadata: GitMetadata) -> CategorizedPath {
        let decision = self.decide(&path, &git_metadata);
        let validated = match decision.category {
            Category::Unchanged => self
                .cache
                .get(&path.route_hash)
                .map_or(false, |entry| entry.validated),
            Category::New | Category::Modified => false,
        };
        debug!(
            route_hash = %path.route_hash,
            category = %decision.category,
            reason = ?decision.reason,
            "categorized path"
        );
        CategorizedPath {
            path,
            category: decision.category,
            validated,
            git_metadata,
            reason: decision.reason,
        }
    }

    /// Cache entry to persist for a categorized path.
    pub fn updated_entry(&self, categorized: &CategorizedPath) -> CacheEntry {
        let previous = self.cache.get(&categorized.path.route_hash);
        let git = &categorized.git_metadata;

        let created_date = match (previous.and_then(CacheEntry::created_timestamp), git.created_date) {
            (Some(old), Some(fresh)) => Some(format_timestamp(&old.min(fresh))),
            (None, Some(fresh)) => Some(format_timestamp(&fresh)),
            _ => previous.and_then(|e| e.created_date.clone()),
        };
        let commit_date = git
            .commit_date
            .map(|ts| format_timestamp(&ts))
            .or_else(|| previous.and_then(|e| e.commit_date.clone()));

        CacheEntry {
            route: categorized.path.route_display(),
            prose_fingerprint: Some(categorized.path.prose_fingerprint.clone()),
            raw_fingerprint: Some(categorized.path.raw_fingerprint.clone()),
            category: Some(categorized.category),
            validated: categorized.validated,
            created_date,
            commit_date,
            extra: previous.map(|e| e.extra.clone()).unwrap_or_default(),
        }
    }

    /// The cache to persist after this run, and how many stale entries
    /// were dropped.
    ///
    /// Only currently reachable routes are kept.
    pub fn build_cache(&self, paths: &[CategorizedPath]) -> (ValidationCache, usize) {
        let mut next = ValidationCache::new();
        for categorized in paths {
            let hash = categorized.path.route_hash.clone();
            if next.insert(hash, self.updated_entry(categorized)).is_some() {
                warn!(route_hash = %categorized.path.route_hash, "route hash collision, keeping last");
            }
        }
        if let Some(ts) = self.cache.last_updated() {
            next.set_last_updated(ts);
        }

        let dropped = self
            .cache
            .entries()
            .keys()
            .filter(|hash| next.get(hash).is_none())
            .count();
        if dropped > 0 {
            debug!(dropped, "dropping unreachable cache entries");
        }
        (next, dropped)
    }

    fn best_prose_match(&self, path: &StoryPath) -> Option<(&'c RouteHash, f32)> {
        let candidates = self.by_prose.get(path.prose_fingerprint.as_str())?;
        let passages = path.passage_set();

        let mut best: Option<(&'c RouteHash, f32)> = None;
        for candidate in candidates {
            let similarity = jaccard_similarity(&passages, &candidate.passages);
            if similarity < self.threshold {
                continue;
            }
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((candidate.hash, similarity));
            }
        }
        best
    }
}
