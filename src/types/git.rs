//! Version-control metadata attached to paths.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Commit timestamps for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHistory {
    /// Most recent commit touching the file.
    pub latest: DateTime<Utc>,
    /// Earliest commit touching the file (creation).
    pub earliest: DateTime<Utc>,
    /// Number of commits seen.
    pub commit_count: usize,
}

impl FileHistory {
    /// Build from a set of commit timestamps. `None` if there are none.
    pub fn from_timestamps<I: IntoIterator<Item = DateTime<Utc>>>(timestamps: I) -> Option<Self> {
        let mut iter = timestamps.into_iter();
        let first = iter.next()?;
        let mut history = Self {
            latest: first,
            earliest: first,
            commit_count: 1,
        };
        for ts in iter {
            history.latest = history.latest.max(ts);
            history.earliest = history.earliest.min(ts);
            history.commit_count += 1;
        }
        Some(history)
    }
}

/// Why a file contributed no history.
///
/// A value, not a propagated error: each issue degrades one file's
/// contribution and never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentIssue {
    /// The git query did not finish in time.
    #[error("git query for {file} timed out after {timeout_ms}ms")]
    Timeout {
        /// File being queried.
        file: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },
    /// The file has no commits.
    #[error("{file} is not tracked by git")]
    Untracked {
        /// File being queried.
        file: String,
    },
    /// git could not be started.
    #[error("failed to spawn git for {file}: {message}")]
    Spawn {
        /// File being queried.
        file: String,
        /// Spawn error text.
        message: String,
    },
    /// git exited unsuccessfully.
    #[error("git exited with {status} for {file}: {stderr}")]
    GitFailed {
        /// File being queried.
        file: String,
        /// Exit code, or -1 when killed by a signal.
        status: i32,
        /// Trimmed stderr.
        stderr: String,
    },
    /// History lookups are turned off for this run.
    #[error("history lookups disabled")]
    Disabled,
}

/// Version-control metadata for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMetadata {
    /// Distinct source files defining passages on the route.
    pub files: BTreeSet<String>,
    /// Passage name → defining file, for passages on the route.
    pub passage_files: BTreeMap<String, String>,
    /// Latest commit among the files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_date: Option<DateTime<Utc>>,
    /// Earliest commit among the files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    /// Per-file problems encountered while enriching.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<EnrichmentIssue>,
    /// Whether any file gained new prose since the cached commit.
    ///
    /// `None` when no baseline was requested or the check could not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prose_change: Option<bool>,
}

impl GitMetadata {
    /// At least one file contributed a timestamp.
    pub fn is_enriched(&self) -> bool {
        self.commit_date.is_some()
    }

    /// Enrichment was partial or absent.
    pub fn is_degraded(&self) -> bool {
        !self.is_enriched() || !self.issues.is_empty()
    }
}

/// Parse a cache timestamp.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS[.frac]` (read as UTC),
/// which older caches wrote.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Format a timestamp the way the cache stores it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
