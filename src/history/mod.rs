//! Version-control history backends.

pub mod memory;
pub mod git;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{EnrichmentIssue, FileHistory};

/// Trait for history backends.
///
/// Every query addresses a single repository-relative file and is
/// read-only, so implementations may be queried concurrently.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Commit timestamps for a file.
    async fn file_history(&self, file: &str) -> Result<FileHistory, EnrichmentIssue>;

    /// Whether the file gained prose (not just links) since `since`.
    ///
    /// A file that did not exist at `since` counts as all-new prose.
    async fn prose_changed_since(
        &self,
        file: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, EnrichmentIssue>;
}

/// History source for runs with version control turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

#[async_trait]
impl HistorySource for NoHistory {
    async fn file_history(&self, _file: &str) -> Result<FileHistory, EnrichmentIssue> {
        Err(EnrichmentIssue::Disabled)
    }

    async fn prose_changed_since(
        &self,
        _file: &str,
        _since: DateTime<Utc>,
    ) -> Result<bool, EnrichmentIssue> {
        Err(EnrichmentIssue::Disabled)
    }
}

pub use memory::InMemoryHistory;
pub use git::GitCli;
