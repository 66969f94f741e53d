//! In-memory history source for testing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{EnrichmentIssue, FileHistory};
use super::HistorySource;

/// One recorded revision of a file.
#[derive(Debug, Clone)]
struct Revision {
    at: DateTime<Utc>,
    text: String,
}

/// In-memory history source for testing.
///
/// Files are recorded as a list of timestamped revisions. Prose checks
/// compare the newest revision with the newest one at or before the
/// baseline, using the same diff rule as the git backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    revisions: BTreeMap<String, Vec<Revision>>,
    timeouts: BTreeMap<String, u64>,
}

impl InMemoryHistory {
    /// Create a new empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a revision of a file.
    pub fn commit(&mut self, file: &str, at: DateTime<Utc>, text: &str) {
        let revisions = self.revisions.entry(file.to_string()).or_default();
        revisions.push(Revision {
            at,
            text: text.to_string(),
        });
        revisions.sort_by_key(|r| r.at);
    }

    /// Make every query for `file` time out.
    pub fn time_out(&mut self, file: &str, timeout_ms: u64) {
        self.timeouts.insert(file.to_string(), timeout_ms);
    }

    /// Number of tracked files.
    pub fn num_files(&self) -> usize {
        self.revisions.len()
    }

    fn check_timeout(&self, file: &str) -> Result<(), EnrichmentIssue> {
        match self.timeouts.get(file) {
            Some(&timeout_ms) => Err(EnrichmentIssue::Timeout {
                file: file.to_string(),
                timeout_ms,
            }),
            None => Ok(()),
        }
    }

    fn revisions(&self, file: &str) -> Result<&[Revision], EnrichmentIssue> {
        self.check_timeout(file)?;
        match self.revisions.get(file) {
            Some(revisions) if !revisions.is_empty() => Ok(revisions),
            _ => Err(EnrichmentIssue::Untracked {
                file: file.to_string(),
            }),
        }
    }
}

#[async_trait]
impl HistorySource for InMemoryHistory {
    async fn file_history(&self, file: &str) -> Result<FileHistory, EnrichmentIssue> {
        let revisions = self.revisions(file)?;
        FileHistory::from_timestamps(revisions.iter().map(|r| r.at)).ok_or_else(|| {
            EnrichmentIssue::Untracked {
                file: file.to_string(),
            }
        })
    }

    async fn prose_changed_since(
        &self,
        file: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, EnrichmentIssue> {
        let revisions = self.revisions(file)?;
        let Some(current) = revisions.last() else {
            return Ok(false);
        };
        match revisions.iter().rev().find(|r| r.at <= since) {
            Some(base) => Ok(super::git::text_introduces_prose(&base.text, &current.text)),
            None => Ok(true),
        }
    }
}
