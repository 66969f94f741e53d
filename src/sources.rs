//! Passage → source file index.
//!
//! The parser that builds the story graph does not always say which file
//! defined a passage. The index fills that gap by scanning Twee sources for
//! passage headers:
//!
//! ```text
//! :: Passage Name [tag1 tag2] {"position":"100,200"}
//! ```
//!
//! Paths are stored relative to the repository root with `/` separators,
//! because that is how they are handed to git.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::types::StoryGraph;

/// File extensions treated as Twee sources.
const TWEE_EXTENSIONS: &[&str] = &["twee", "tw"];

/// Map from passage name to the file that defines it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassageIndex {
    files: BTreeMap<String, String>,
}

impl PassageIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `source_dir` for Twee files and index their passage headers.
    ///
    /// Directory entries are visited in file-name order, so when a passage
    /// is defined twice the first definition in that order wins.
    pub fn scan(repo_root: &Path, source_dir: &Path) -> io::Result<Self> {
        if !source_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("source directory not found: {}", source_dir.display()),
            ));
        }

        let mut index = Self::new();
        for entry in WalkDir::new(source_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    None
                }
            })
        {
            if !entry.file_type().is_file() || !is_twee(entry.path()) {
                continue;
            }

            let text = match std::fs::read_to_string(entry.path()) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping unreadable source");
                    continue;
                }
            };

            let file = repo_relative(repo_root, entry.path());
            for name in parse_passage_headers(&text) {
                index.insert_first(name, &file);
            }
        }

        debug!(passages = index.len(), dir = %source_dir.display(), "indexed passage sources");
        Ok(index)
    }

    /// Overlay `source_file` hints carried by the graph itself.
    ///
    /// Hints from the graph replace scanned entries.
    pub fn merge_graph_hints(&mut self, graph: &StoryGraph) {
        for (name, passage) in &graph.passages {
            if let Some(file) = &passage.source_file {
                self.files.insert(name.clone(), file.replace('\\', "/"));
            }
        }
    }

    /// Record a mapping explicitly.
    pub fn insert(&mut self, passage: impl Into<String>, file: impl Into<String>) {
        self.files.insert(passage.into(), file.into());
    }

    /// File defining `passage`, if known.
    pub fn get(&self, passage: &str) -> Option<&str> {
        self.files.get(passage).map(String::as_str)
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The whole mapping.
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    fn insert_first(&mut self, name: String, file: &str) {
        match self.files.get(&name) {
            Some(existing) => {
                warn!(passage = %name, kept = %existing, ignored = %file, "duplicate passage definition");
            }
            None => {
                self.files.insert(name, file.to_string());
            }
        }
    }
}

/// Passage names declared by `:: Name` headers in a Twee document.
pub fn parse_passage_headers(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("::"))
        .filter_map(header_name)
        .collect()
}

/// Name part of a header: everything up to the first unescaped `[` or `{`.
fn header_name(rest: &str) -> Option<String> {
    let mut name = String::with_capacity(rest.len());
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    name.push(escaped);
                }
            }
            '[' | '{' => break,
            _ => name.push(c),
        }
    }
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn is_twee(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| TWEE_EXTENSIONS.contains(&ext))
}

fn repo_relative(repo_root: &Path, path: &Path) -> String {
    let relative: PathBuf = path
        .strip_prefix(repo_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf());
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
