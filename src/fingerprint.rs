//! Path fingerprints: route identity, prose and raw content digests.
//!
//! ## Three Levels
//!
//! ```text
//! route_hash(route)        = hex(SHA256(join(route, " → ")))[..8]
//! prose_fingerprint(route) = hex(SHA256(join(normalize(strip_links(prose_i)), "\n")))
//! raw_fingerprint(route)   = hex(SHA256(join(normalize(prose_i), "\n")))
//! ```
//!
//! - `route_hash` is sensitive to any reordering, insertion, removal or
//!   rename of a passage name. It is the path's identity.
//! - `prose_fingerprint` ignores passage names and link markup, so it is
//!   invariant under renames and re-linking that leave prose untouched.
//! - `raw_fingerprint` keeps link markup, so it detects re-linking when the
//!   prose is identical.
//!
//! ## Normalization
//!
//! ```text
//! normalize(text) = trim(collapse_blank_runs(trim_end_each_line(normalize_newlines(text))))
//! ```
//!
//! Trailing spaces and runs of blank lines never register as changes.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex_lite::Regex;
use sha2::{Digest, Sha256};

use crate::types::RouteHash;

/// Version of the fingerprint specification.
///
/// Changes to this version invalidate every cached fingerprint.
pub const FINGERPRINT_VERSION: &str = "1.0.0";

/// Separator used in human-readable routes and in the route hash input.
pub const ROUTE_SEPARATOR: &str = " → ";

/// Separator older caches used in their `route` field.
const LEGACY_ROUTE_SEPARATOR: &str = " -> ";

/// `[[...]]` link markup in any of its forms.
fn link_pattern() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r"\[\[[^\[\]]*\]\]").expect("Invalid link markup regex"))
}

/// Arrow-joined, human-readable route.
pub fn route_display(route: &[String]) -> String {
    route.join(ROUTE_SEPARATOR)
}

/// Split a cached `route` string back into passage names.
///
/// Accepts both the current and the legacy separator.
pub fn split_route_display(display: &str) -> Vec<&str> {
    display
        .split(ROUTE_SEPARATOR)
        .flat_map(|part| part.split(LEGACY_ROUTE_SEPARATOR))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Stable 8-character identity of an ordered route.
///
/// # Example
///
/// ```rust
/// use story_path_kernel::fingerprint::route_hash;
///
/// let a = route_hash(&["Start".to_string(), "End".to_string()]);
/// let b = route_hash(&["Start".to_string(), "End".to_string()]);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 8);
/// ```
pub fn route_hash(route: &[String]) -> RouteHash {
    let digest = sha256_hex(route_display(route).as_bytes());
    RouteHash::new(&digest[..RouteHash::LEN])
}

/// Remove every `[[...]]` link, in arrow (`[[text->target]]`,
/// `[[target<-text]]`), pipe or plain (`[[target]]`) form.
///
/// Links contribute nothing; the surrounding prose is kept as is.
pub fn strip_link_markup(text: &str) -> String {
    link_pattern().replace_all(text, "").into_owned()
}

/// Normalize whitespace so cosmetic edits do not change fingerprints.
///
/// Transformations applied:
/// 1. Normalize newlines: CRLF → LF, isolated CR → LF
/// 2. Strip trailing whitespace from every line
/// 3. Collapse runs of blank lines into one
/// 4. Trim leading and trailing whitespace
///
/// # Example
///
/// ```rust
/// use story_path_kernel::fingerprint::normalize_prose;
///
/// let text = "  Hello  \r\n\r\n\r\nWorld  ";
/// assert_eq!(normalize_prose(text), "Hello\n\nWorld");
/// ```
pub fn normalize_prose(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut previous_blank = false;
    for line in unified.split('\n') {
        let line = line.trim_end();
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        if !out.is_empty() || !blank {
            out.push_str(line);
            out.push('\n');
        }
        previous_blank = blank;
    }

    out.trim().to_string()
}

/// Prose of a passage with links stripped, normalized.
pub fn canonical_prose(text: &str) -> String {
    normalize_prose(&strip_link_markup(text))
}

/// Digest over the route's prose with link markup removed.
///
/// Passages are joined by a newline, so splitting a passage at a line
/// break keeps the fingerprint. Passages missing from
/// `content_by_passage`, or left empty once links are stripped, contribute
/// nothing.
pub fn prose_fingerprint(content_by_passage: &BTreeMap<String, String>, route: &[String]) -> String {
    fingerprint_with(content_by_passage, route, canonical_prose)
}

/// Digest over the route's prose including link markup.
pub fn raw_fingerprint(content_by_passage: &BTreeMap<String, String>, route: &[String]) -> String {
    fingerprint_with(content_by_passage, route, normalize_prose)
}

fn fingerprint_with(
    content_by_passage: &BTreeMap<String, String>,
    route: &[String],
    canonicalize: fn(&str) -> String,
) -> String {
    let mut hasher = Sha256::new();
    let mut first = true;
    for name in route {
        let prose = content_by_passage.get(name).map(String::as_str).unwrap_or("");
        let text = canonicalize(prose);
        // Empty passages (pure choice hubs) contribute nothing.
        if text.is_empty() {
            continue;
        }
        if !first {
            hasher.update(b"\n");
        }
        hasher.update(text.as_bytes());
        first = false;
    }
    hex::encode(hasher.finalize())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
