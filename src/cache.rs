//! Validation cache: the persisted record of previously seen routes.
//!
//! ## On-disk Shape
//!
//! ```json
//! {
//!   "1a2b3c4d": {
//!     "route": "Start → A → End",
//!     "content_fingerprint": "…",
//!     "raw_content_fingerprint": "…",
//!     "category": "new",
//!     "validated": false,
//!     "created_date": "2025-01-01T00:00:00Z",
//!     "commit_date": "2025-02-01T00:00:00Z"
//!   },
//!   "last_updated": "2025-11-01T00:00:00"
//! }
//! ```
//!
//! The document mixes entries with a bare `last_updated` string. In memory
//! the two are separate fields of [`ValidationCache`], so nothing past
//! [`ValidationCache::from_value`] ever sees a non-entry value.
//!
//! Loading never fails: a missing file is an empty cache, a corrupt file is
//! logged and treated as empty. Saving is atomic (write temp, then rename).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::fingerprint::split_route_display;
use crate::types::{format_timestamp, parse_timestamp, Category, RouteHash};

/// Top-level key holding the save timestamp.
pub const LAST_UPDATED_KEY: &str = "last_updated";

/// Error writing the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure while writing or renaming.
    #[error("Failed to write validation cache {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The cache could not be serialized.
    #[error("Failed to serialize validation cache: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One persisted route record.
///
/// Every field except `route` may be absent in caches written by older
/// versions. Unknown fields are kept and written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Arrow-joined passage names.
    #[serde(default)]
    pub route: String,
    /// Prose fingerprint.
    #[serde(
        rename = "content_fingerprint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prose_fingerprint: Option<String>,
    /// Raw fingerprint (link markup included).
    #[serde(
        rename = "raw_content_fingerprint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_fingerprint: Option<String>,
    /// Category assigned on the run that wrote this entry.
    #[serde(
        default,
        deserialize_with = "lenient_category",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Category>,
    /// Author-controlled review flag.
    #[serde(default)]
    pub validated: bool,
    /// Earliest commit touching the route's files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    /// Latest commit touching the route's files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_date: Option<String>,
    /// Fields this version does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Unknown category strings read as absent rather than rejecting the entry.
fn lenient_category<'de, D>(deserializer: D) -> Result<Option<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

impl CacheEntry {
    /// Passage names of the cached route.
    pub fn passages(&self) -> Vec<&str> {
        split_route_display(&self.route)
    }

    /// Parsed `commit_date`.
    pub fn commit_timestamp(&self) -> Option<DateTime<Utc>> {
        self.commit_date.as_deref().and_then(parse_timestamp)
    }

    /// Parsed `created_date`.
    pub fn created_timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_date.as_deref().and_then(parse_timestamp)
    }
}

/// The whole persisted cache document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationCache {
    entries: BTreeMap<RouteHash, CacheEntry>,
    last_updated: Option<String>,
}

impl ValidationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a parsed document.
    ///
    /// Non-object values are skipped; `last_updated` is kept separately.
    /// Objects that do not parse as entries are skipped with a warning.
    pub fn from_value(value: Value) -> Self {
        let mut cache = Self::new();
        let Value::Object(map) = value else {
            warn!("validation cache is not a JSON object, starting empty");
            return cache;
        };

        for (key, value) in map {
            match value {
                Value::Object(_) => match serde_json::from_value::<CacheEntry>(value) {
                    Ok(entry) => {
                        cache.entries.insert(RouteHash::new(key), entry);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "skipping malformed cache entry");
                    }
                },
                Value::String(s) if key == LAST_UPDATED_KEY => {
                    cache.last_updated = Some(s);
                }
                other => {
                    debug!(key = %key, kind = value_kind(&other), "skipping non-entry cache key");
                }
            }
        }
        cache
    }

    /// Parse a cache document. Corrupt input yields an empty cache.
    pub fn from_json_str(json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                warn!(error = %e, "validation cache is corrupt, starting empty");
                Self::new()
            }
        }
    }

    /// Load the cache file. Missing or unreadable files yield an empty cache.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let cache = Self::from_json_str(&text);
                debug!(path = %path.display(), entries = cache.len(), "loaded validation cache");
                cache
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no validation cache yet, starting empty");
                Self::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read validation cache, starting empty");
                Self::new()
            }
        }
    }

    /// Entry for a route hash.
    pub fn get(&self, hash: &RouteHash) -> Option<&CacheEntry> {
        self.entries.get(hash)
    }

    /// All entries in key order.
    pub fn entries(&self) -> &BTreeMap<RouteHash, CacheEntry> {
        &self.entries
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, hash: RouteHash, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(hash, entry)
    }

    /// Number of entries (the `last_updated` key is not one).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the last save, as written.
    pub fn last_updated(&self) -> Option<&str> {
        self.last_updated.as_deref()
    }

    /// Replace the save timestamp verbatim.
    pub fn set_last_updated(&mut self, ts: impl Into<String>) {
        self.last_updated = Some(ts.into());
    }

    /// Stamp the cache with a save time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(format_timestamp(&now));
    }

    /// The on-disk document: entries in key order, then `last_updated`.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut map = Map::new();
        for (hash, entry) in &self.entries {
            map.insert(hash.as_str().to_string(), serde_json::to_value(entry)?);
        }
        if let Some(ts) = &self.last_updated {
            map.insert(LAST_UPDATED_KEY.to_string(), Value::String(ts.clone()));
        }
        Ok(Value::Object(map))
    }

    /// Write the cache to `path` atomically.
    ///
    /// The document goes to a sibling temp file, is flushed to disk, and is
    /// then renamed over `path`. A crash leaves either the old or the new
    /// file, never a partial one.
    pub fn save_atomic(&self, path: &Path) -> Result<(), CacheError> {
        let mut text = serde_json::to_string_pretty(&self.to_value()?)?;
        text.push('\n');

        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(text.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        std::fs::rename(&tmp, path).map_err(io_err)?;
        debug!(path = %path.display(), entries = self.len(), "saved validation cache");
        Ok(())
    }
}

impl FromIterator<(RouteHash, CacheEntry)> for ValidationCache {
    fn from_iter<I: IntoIterator<Item = (RouteHash, CacheEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            last_updated: None,
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
