//! Categories assigned to paths and the modes that select them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification of a path relative to the validation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// The route never existed before, or its prose is genuinely new.
    New,
    /// Same prose, different structure (or change could not be ruled out).
    Modified,
    /// Byte-identical to the cached route, including links.
    Unchanged,
}

impl Category {
    /// Whether this category needs review downstream.
    pub fn needs_review(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Modified => write!(f, "modified"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Which categories are forwarded to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryMode {
    /// Only NEW paths.
    NewOnly,
    /// NEW and MODIFIED paths.
    Modified,
    /// Every path.
    #[default]
    All,
}

impl CategoryMode {
    /// Whether a path of `category` is forwarded in this mode.
    pub fn includes(&self, category: Category) -> bool {
        match self {
            Self::NewOnly => category == Category::New,
            Self::Modified => category != Category::Unchanged,
            Self::All => true,
        }
    }
}

impl FromStr for CategoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new-only" | "new_only" | "new" => Ok(Self::NewOnly),
            "modified" => Ok(Self::Modified),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown mode '{other}' (expected new-only, modified or all)"
            )),
        }
    }
}

impl fmt::Display for CategoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewOnly => write!(f, "new-only"),
            Self::Modified => write!(f, "modified"),
            Self::All => write!(f, "all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Category::Modified).unwrap(), "\"modified\"");
        let parsed: Category = serde_json::from_str("\"unchanged\"").unwrap();
        assert_eq!(parsed, Category::Unchanged);
    }

    #[test]
    fn test_mode_includes() {
        assert!(CategoryMode::NewOnly.includes(Category::New));
        assert!(!CategoryMode::NewOnly.includes(Category::Modified));
        assert!(CategoryMode::Modified.includes(Category::Modified));
        assert!(!CategoryMode::Modified.includes(Category::Unchanged));
        assert!(CategoryMode::All.includes(Category::Unchanged));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("new-only".parse::<CategoryMode>(), Ok(CategoryMode::NewOnly));
        assert_eq!("MODIFIED".parse::<CategoryMode>(), Ok(CategoryMode::Modified));
        assert!("everything".parse::<CategoryMode>().is_err());
    }
}
