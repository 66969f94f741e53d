//! Git enrichment: per-path commit metadata from per-file history.
//!
//! Queries are issued once per distinct file (and once per distinct
//! (file, baseline) pair for prose checks), with at most `concurrency`
//! in flight, then aggregated per path. A failed query degrades the files
//! it covers and is recorded as an [`EnrichmentIssue`]; it never fails the
//! run.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::history::HistorySource;
use crate::types::{EnrichmentIssue, FileHistory, GitMetadata, StoryPath};

/// Per-file history query results.
pub type HistoryResults = BTreeMap<String, Result<FileHistory, EnrichmentIssue>>;
/// Prose check results keyed by file and baseline time.
pub type ProseResults = BTreeMap<(String, DateTime<Utc>), Result<bool, EnrichmentIssue>>;

/// Attaches [`GitMetadata`] to paths using a [`HistorySource`].
pub struct GitEnricher<H: HistorySource + 'static> {
    source: Arc<H>,
    concurrency: usize,
}

impl<H: HistorySource + 'static> GitEnricher<H> {
    /// Create an enricher allowing `concurrency` queries in flight (min 1).
    pub fn new(source: Arc<H>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich a single path.
    ///
    /// `baseline` is the cached commit date for the route; when given,
    /// each tracked file is also checked for new prose since then.
    pub async fn enrich(
        &self,
        path: &StoryPath,
        passage_files: &BTreeMap<String, String>,
        baseline: Option<DateTime<Utc>>,
    ) -> GitMetadata {
        self.enrich_all(std::slice::from_ref(path), passage_files, &[baseline])
            .await
            .pop()
            .unwrap_or_default()
    }

    /// Enrich every path, sharing queries between paths.
    ///
    /// `baselines[i]` belongs to `paths[i]`; missing baselines mean none.
    pub async fn enrich_all(
        &self,
        paths: &[StoryPath],
        passage_files: &BTreeMap<String, String>,
        baselines: &[Option<DateTime<Utc>>],
    ) -> Vec<GitMetadata> {
        let routes: Vec<_> = paths
            .iter()
            .map(|path| route_files(path, passage_files))
            .collect();

        let files: BTreeSet<String> = routes
            .iter()
            .flat_map(|(files, _)| files.iter().cloned())
            .collect();
        let histories = self
            .fan_out(files, |source, file: String| async move {
                source.file_history(&file).await
            })
            .await;

        let mut prose_queries = BTreeSet::new();
        for (i, (files, _)) in routes.iter().enumerate() {
            let Some(since) = baselines.get(i).copied().flatten() else {
                continue;
            };
            for file in files {
                if matches!(histories.get(file), Some(Ok(_))) {
                    prose_queries.insert((file.clone(), since));
                }
            }
        }
        let prose = self
            .fan_out(prose_queries, |source, (file, since): (String, DateTime<Utc>)| async move {
                source.prose_changed_since(&file, since).await
            })
            .await;

        debug!(
            paths = paths.len(),
            files = histories.len(),
            prose_checks = prose.len(),
            "history queries complete"
        );

        routes
            .into_iter()
            .enumerate()
            .map(|(i, (files, mapping))| {
                let since = baselines.get(i).copied().flatten();
                aggregate(files, mapping, &histories, &prose, since)
            })
            .collect()
    }

    /// Run `query` for every key with bounded concurrency.
    async fn fan_out<K, T, F, Fut>(
        &self,
        keys: BTreeSet<K>,
        query: F,
    ) -> BTreeMap<K, Result<T, EnrichmentIssue>>
    where
        K: Ord + Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(Arc<H>, K) -> Fut,
        Fut: Future<Output = Result<T, EnrichmentIssue>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for key in keys {
            let semaphore = semaphore.clone();
            let query = query(self.source.clone(), key.clone());
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (key, query.await)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((key, result)) => {
                    results.insert(key, result);
                }
                Err(e) => {
                    error!(error = %e, "history query task failed");
                }
            }
        }
        results
    }
}

/// Files defining the passages on a path, and the passage → file mapping
/// restricted to the route.
pub fn route_files(
    path: &StoryPath,
    passage_files: &BTreeMap<String, String>,
) -> (BTreeSet<String>, BTreeMap<String, String>) {
    let mapping: BTreeMap<String, String> = path
        .route
        .iter()
        .filter_map(|name| {
            passage_files
                .get(name)
                .map(|file| (name.clone(), file.clone()))
        })
        .collect();
    let files = mapping.values().cloned().collect();
    (files, mapping)
}

/// Fold per-file results into one path's metadata.
///
/// - `commit_date` is the latest commit across files, `created_date` the
///   earliest.
/// - `prose_change` considers files with history only: any `true` wins,
///   all `false` gives `false`, anything else is unknown.
pub fn aggregate(
    files: BTreeSet<String>,
    passage_files: BTreeMap<String, String>,
    histories: &HistoryResults,
    prose: &ProseResults,
    since: Option<DateTime<Utc>>,
) -> GitMetadata {
    let mut meta = GitMetadata {
        passage_files,
        ..Default::default()
    };

    let mut tracked = Vec::new();
    for file in &files {
        match histories.get(file) {
            Some(Ok(history)) => {
                meta.commit_date = Some(meta.commit_date.map_or(history.latest, |d| d.max(history.latest)));
                meta.created_date =
                    Some(meta.created_date.map_or(history.earliest, |d| d.min(history.earliest)));
                tracked.push(file);
            }
            Some(Err(issue)) => meta.issues.push(issue.clone()),
            None => meta.issues.push(EnrichmentIssue::Spawn {
                file: file.clone(),
                message: "history query did not complete".to_string(),
            }),
        }
    }

    if let Some(since) = since {
        let mut any_changed = false;
        let mut all_known = !tracked.is_empty();
        for file in tracked {
            match prose.get(&(file.clone(), since)) {
                Some(Ok(true)) => any_changed = true,
                Some(Ok(false)) => {}
                Some(Err(issue)) => {
                    meta.issues.push(issue.clone());
                    all_known = false;
                }
                None => all_known = false,
            }
        }
        meta.prose_change = if any_changed {
            Some(true)
        } else if all_known {
            Some(false)
        } else {
            None
        };
    }

    meta.files = files;
    meta
}
