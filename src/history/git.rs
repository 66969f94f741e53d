//! git command-line history source.
//!
//! Spawns one `git` process per query. Each runs under its own timeout and
//! is killed when the timeout elapses.
//!
//! ## Git Commands
//!
//! History (merge commits included):
//!
//! ```bash
//! git log --full-history -m --format=%cI -- <file>
//! ```
//!
//! Prose change since a baseline:
//!
//! ```bash
//! git rev-list -1 --before=<since> HEAD -- <file>
//! git diff --unified=0 --no-color <base> -- <file>
//! ```
//!
//! A diff introduces prose when some added line, with link markup stripped
//! and whitespace normalized, is non-empty and is not among the removed
//! lines' normalized forms. Twee passage headers (`:: Name`) are structure.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::fingerprint::canonical_prose;
use crate::types::{EnrichmentIssue, FileHistory};
use super::HistorySource;

/// History source backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
    timeout: Duration,
}

impl GitCli {
    /// Create a source for the repository at `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeout,
        }
    }

    /// Repository root queries run in.
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Run git with a timeout and return stdout.
    async fn run(&self, file: &str, args: &[&str]) -> Result<String, EnrichmentIssue> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                warn!(file, timeout_ms = self.timeout.as_millis() as u64, "git query timed out");
                return Err(EnrichmentIssue::Timeout {
                    file: file.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                warn!(file, error = %e, "failed to spawn git");
                return Err(EnrichmentIssue::Spawn {
                    file: file.to_string(),
                    message: e.to_string(),
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(file, status = ?output.status.code(), stderr = %stderr, "git exited unsuccessfully");
            return Err(EnrichmentIssue::GitFailed {
                file: file.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl HistorySource for GitCli {
    async fn file_history(&self, file: &str) -> Result<FileHistory, EnrichmentIssue> {
        let log = self
            .run(file, &["log", "--full-history", "-m", "--format=%cI", "--", file])
            .await?;

        parse_log_timestamps(&log).ok_or_else(|| {
            debug!(file, "no commits for file");
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
        let before = format!("--before={}", since.format("%Y-%m-%d %H:%M:%S +0000"));
        let base = self
            .run(file, &["rev-list", "-1", before.as_str(), "HEAD", "--", file])
            .await?;
        let base = base.trim();
        if base.is_empty() {
            return Ok(true);
        }

        let diff = self
            .run(file, &["diff", "--unified=0", "--no-color", base, "--", file])
            .await?;
        Ok(diff_introduces_prose(&diff))
    }
}

/// Parse `%cI` lines into a [`FileHistory`]. Unparseable lines are skipped.
pub fn parse_log_timestamps(log: &str) -> Option<FileHistory> {
    FileHistory::from_timestamps(
        log.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| DateTime::parse_from_rfc3339(line).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    )
}

/// Whether a `--unified=0` diff adds prose rather than only links.
pub fn diff_introduces_prose(diff: &str) -> bool {
    let mut removed = Vec::new();
    let mut added = Vec::new();
    let mut in_hunk = false;
    for line in diff.lines() {
        // File headers (`diff --git`, `---`, `+++`) only precede the first hunk.
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if line.starts_with("diff --git") {
            in_hunk = false;
        }
        if !in_hunk {
            continue;
        }
        if let Some(rest) = line.strip_prefix('+') {
            added.push(rest);
        } else if let Some(rest) = line.strip_prefix('-') {
            removed.push(rest);
        }
    }
    introduces_prose(removed, added)
}

/// Whether `new` contains prose lines `old` does not.
pub fn text_introduces_prose(old: &str, new: &str) -> bool {
    introduces_prose(old.lines(), new.lines())
}

fn introduces_prose<'a>(
    removed: impl IntoIterator<Item = &'a str>,
    added: impl IntoIterator<Item = &'a str>,
) -> bool {
    let removed: BTreeSet<String> = removed.into_iter().filter_map(prose_line).collect();
    added
        .into_iter()
        .filter_map(prose_line)
        .any(|line| !removed.contains(&line))
}

/// Canonical prose of one source line, or `None` for structure.
fn prose_line(line: &str) -> Option<String> {
    if line.trim_start().starts_with("::") {
        return None;
    }
    let prose = canonical_prose(line);
    (!prose.is_empty()).then_some(prose)
}
