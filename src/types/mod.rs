//! Core types for the path kernel.

pub mod graph;
pub mod path;
pub mod category;
pub mod git;

pub use graph::{StoryGraph, Passage, GraphError};
pub use path::{RouteHash, Route, PathEnd, StoryPath};
pub use category::{Category, CategoryMode};
pub use git::{FileHistory, EnrichmentIssue, GitMetadata, parse_timestamp, format_timestamp};
