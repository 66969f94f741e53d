//! Path types: routes through the story and their fingerprints.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{prose_fingerprint, raw_fingerprint, route_display, route_hash};
use super::graph::StoryGraph;

/// Stable 8-hex-character identifier of a route.
///
/// Wraps a `String` and implements `Ord` so caches keyed by it iterate
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteHash(String);

impl RouteHash {
    /// Length of a route hash in hex characters.
    pub const LEN: usize = 8;

    /// Wrap an existing hash string.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Get the hash as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this looks like a hash produced by [`route_hash`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::LEN
            && self.0.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for RouteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RouteHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a route ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathEnd {
    /// Reached a passage with no outgoing links.
    Terminal,
    /// Followed a link to a passage that does not exist.
    MissingPassage,
    /// Every continuation would have exceeded the cycle budget.
    CycleCutoff,
}

impl fmt::Display for PathEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal => write!(f, "terminal"),
            Self::MissingPassage => write!(f, "missing_passage"),
            Self::CycleCutoff => write!(f, "cycle_cutoff"),
        }
    }
}

/// A raw route produced by traversal, before fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Passage names from the start passage onward.
    pub passages: Vec<String>,
    /// How the route ended.
    pub end: PathEnd,
}

impl Route {
    /// Create a route.
    pub fn new(passages: Vec<String>, end: PathEnd) -> Self {
        Self { passages, end }
    }
}

/// A fingerprinted path through the story.
///
/// Immutable after construction; recomputed on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryPath {
    /// Stable identity of the ordered route.
    pub route_hash: RouteHash,
    /// Ordered passage names.
    pub route: Vec<String>,
    /// Digest of the route's prose with link markup removed.
    pub prose_fingerprint: String,
    /// Digest of the route's prose including link markup.
    pub raw_fingerprint: String,
    /// Prose by passage name, for downstream rendering.
    pub content: BTreeMap<String, String>,
    /// How the route ended.
    pub end: PathEnd,
}

impl StoryPath {
    /// Fingerprint a traversal route against the graph it came from.
    ///
    /// Passages missing from the graph contribute empty prose.
    pub fn from_route(route: Route, graph: &StoryGraph) -> Self {
        let content: BTreeMap<String, String> = route
            .passages
            .iter()
            .map(|name| {
                let prose = graph
                    .passage(name)
                    .map(|p| p.content.clone())
                    .unwrap_or_default();
                (name.clone(), prose)
            })
            .collect();

        Self {
            route_hash: route_hash(&route.passages),
            prose_fingerprint: prose_fingerprint(&content, &route.passages),
            raw_fingerprint: raw_fingerprint(&content, &route.passages),
            route: route.passages,
            content,
            end: route.end,
        }
    }

    /// Human-readable, arrow-joined route.
    pub fn route_display(&self) -> String {
        route_display(&self.route)
    }

    /// Unordered set of passage names on the route.
    pub fn passage_set(&self) -> BTreeSet<&str> {
        self.route.iter().map(String::as_str).collect()
    }

    /// Number of passages on the route (counting revisits).
    pub fn len(&self) -> usize {
        self.route.len()
    }

    /// Routes are never empty; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.route.is_empty()
    }
}
