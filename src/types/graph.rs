//! Story graph types: the parsed passage graph handed to the kernel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalFold;
use crate::STORY_PATH_SCHEMA_VERSION;

/// Error loading a story graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph file could not be read.
    #[error("Failed to read story graph {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The graph document is not valid JSON for the expected shape.
    #[error("Malformed story graph: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single passage of the story.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Prose content, including link markup.
    #[serde(default)]
    pub content: String,
    /// Outgoing passage names, in authored order.
    #[serde(default)]
    pub links: Vec<String>,
    /// Source file that defines this passage, when the parser knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl Passage {
    /// Create a passage with content and links.
    pub fn new(content: impl Into<String>, links: &[&str]) -> Self {
        Self {
            content: content.into(),
            links: links.iter().map(|l| l.to_string()).collect(),
            source_file: None,
        }
    }

    /// Attach a source file.
    pub fn with_source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    /// A passage with no outgoing links ends every route that reaches it.
    pub fn is_terminal(&self) -> bool {
        self.links.is_empty()
    }
}

/// The whole story graph.
///
/// Passages are kept in a `BTreeMap` so iteration (and therefore hashing)
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryGraph {
    /// Passages by name.
    #[serde(default)]
    pub passages: BTreeMap<String, Passage>,
    /// Name of the start passage.
    #[serde(default)]
    pub start_passage: String,
    /// Free-form metadata (title, format version, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl StoryGraph {
    /// Create an empty graph with the given start passage.
    pub fn new(start_passage: impl Into<String>) -> Self {
        Self {
            start_passage: start_passage.into(),
            ..Self::default()
        }
    }

    /// Add or replace a passage.
    pub fn add_passage(&mut self, name: impl Into<String>, passage: Passage) {
        self.passages.insert(name.into(), passage);
    }

    /// Builder-style variant of [`StoryGraph::add_passage`].
    pub fn with_passage(mut self, name: &str, content: &str, links: &[&str]) -> Self {
        self.add_passage(name, Passage::new(content, links));
        self
    }

    /// Parse a graph from its JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a graph file.
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let text = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Look up a passage by name.
    pub fn passage(&self, name: &str) -> Option<&Passage> {
        self.passages.get(name)
    }

    /// Resolve the start passage, if it exists.
    pub fn start(&self) -> Option<(&str, &Passage)> {
        self.passages
            .get_key_value(self.start_passage.as_str())
            .map(|(name, passage)| (name.as_str(), passage))
    }

    /// Story title from metadata, if present.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }

    /// All `(from, to)` links whose target is not a passage.
    pub fn dangling_links(&self) -> Vec<(&str, &str)> {
        self.passages
            .iter()
            .flat_map(|(name, passage)| {
                passage
                    .links
                    .iter()
                    .filter(|target| !self.passages.contains_key(target.as_str()))
                    .map(move |target| (name.as_str(), target.as_str()))
            })
            .collect()
    }

    /// Deterministic identifier of the graph's state.
    ///
    /// Folds the start passage and every (name, content, links) triple in
    /// name order. Metadata is excluded.
    pub fn snapshot_id(&self) -> String {
        let mut fold = CanonicalFold::new(STORY_PATH_SCHEMA_VERSION);
        fold.field(self.start_passage.as_bytes());
        for (name, passage) in &self.passages {
            fold.field(name.as_bytes());
            fold.field(passage.content.as_bytes());
            fold.field(&(passage.links.len() as u64).to_le_bytes());
            for link in &passage.links {
                fold.field(link.as_bytes());
            }
        }
        fold.finish_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interface_contract() {
        let json = r#"{
            "passages": {
                "Start": {"content": "Hello [[Go->End]]", "links": ["End"]},
                "End": {"content": "Bye", "links": []}
            },
            "start_passage": "Start",
            "metadata": {"title": "Demo", "format": "Harlowe 3"}
        }"#;

        let graph = StoryGraph::from_json_str(json).unwrap();
        assert_eq!(graph.passages.len(), 2);
        assert_eq!(graph.start().map(|(name, _)| name), Some("Start"));
        assert_eq!(graph.title(), Some("Demo"));
        assert!(graph.passage("End").unwrap().is_terminal());
    }

    #[test]
    fn test_missing_fields_default() {
        let graph = StoryGraph::from_json_str(r#"{"passages": {"A": {}}}"#).unwrap();
        assert_eq!(graph.start_passage, "");
        assert!(graph.start().is_none());
        assert_eq!(graph.passage("A").unwrap().content, "");
    }

    #[test]
    fn test_malformed_json_is_error() {
        let err = StoryGraph::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, GraphError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = StoryGraph::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, GraphError::Io { .. }));
    }

    #[test]
    fn test_dangling_links() {
        let graph = StoryGraph::new("Start")
            .with_passage("Start", "", &["A", "Ghost"])
            .with_passage("A", "", &[]);

        assert_eq!(graph.dangling_links(), vec![("Start", "Ghost")]);
    }

    #[test]
    fn test_snapshot_id_tracks_content() {
        let g1 = StoryGraph::new("Start").with_passage("Start", "one", &[]);
        let g2 = StoryGraph::new("Start").with_passage("Start", "one", &[]);
        let g3 = StoryGraph::new("Start").with_passage("Start", "two", &[]);

        assert_eq!(g1.snapshot_id(), g2.snapshot_id());
        assert_ne!(g1.snapshot_id(), g3.snapshot_id());
    }

    #[test]
    fn test_snapshot_id_ignores_metadata() {
        let g1 = StoryGraph::new("Start").with_passage("Start", "one", &[]);
        let mut g2 = g1.clone();
        g2.metadata
            .insert("title".to_string(), serde_json::Value::String("New".into()));

        assert_eq!(g1.snapshot_id(), g2.snapshot_id());
    }
}
