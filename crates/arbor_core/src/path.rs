//! Slash-delimited paths and subtree patterns.
//!
//! A concrete path such as `/jobs/counter/job` addresses exactly one node.
//! A pattern is either a concrete path (matches only itself) or a prefix
//! ending in `/*`, which matches the prefix and everything beneath it.
//! Matching is segment-wise, so `/jobs/*` never matches `/jobsx`.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trailing wildcard segment
pub const WILDCARD: &str = "*";

/// Split a path into its non-empty segments
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Canonical form of a path: leading slash, no empty segments
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let segments = split_path(path);
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Append a segment to a path
#[must_use]
pub fn join_path(base: &str, name: &str) -> String {
    let base = normalize_path(base);
    if base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Parent of a path, `None` for the root
#[must_use]
pub fn parent_path(path: &str) -> Option<String> {
    let segments = split_path(path);
    if segments.is_empty() {
        return None;
    }
    let parent = &segments[..segments.len() - 1];
    if parent.is_empty() {
        Some("/".to_string())
    } else {
        Some(format!("/{}", parent.join("/")))
    }
}

/// A path pattern, optionally ending in a subtree wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    segments: Vec<String>,
    wildcard: bool,
}

impl Pattern {
    /// Parse a pattern
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the pattern is not absolute or uses `*`
    /// anywhere except as the final segment
    pub fn parse(text: &str) -> CoreResult<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return Err(CoreError::InvalidPath {
                path: text.to_string(),
                reason: "patterns must start with '/'".to_string(),
            });
        }

        let mut segments: Vec<String> = split_path(text).into_iter().map(str::to_string).collect();
        let wildcard = segments.last().is_some_and(|s| s == WILDCARD);
        if wildcard {
            segments.pop();
        }
        if let Some(bad) = segments.iter().find(|s| s.contains('*')) {
            return Err(CoreError::InvalidPath {
                path: text.to_string(),
                reason: format!("wildcard only allowed as trailing segment, found '{}'", bad),
            });
        }

        Ok(Self { segments, wildcard })
    }

    /// Pattern matching exactly one concrete path
    #[must_use]
    pub fn exact(path: &str) -> Self {
        Self {
            segments: split_path(path).into_iter().map(str::to_string).collect(),
            wildcard: false,
        }
    }

    /// Pattern matching the whole tree (`/*`)
    #[must_use]
    pub fn everything() -> Self {
        Self {
            segments: Vec::new(),
            wildcard: true,
        }
    }

    /// Does this pattern match the concrete path?
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let segments = split_path(path);
        if self.wildcard {
            segments.len() >= self.segments.len()
                && self.segments.iter().zip(&segments).all(|(p, s)| p == s)
        } else {
            segments.len() == self.segments.len()
                && self.segments.iter().zip(&segments).all(|(p, s)| p == s)
        }
    }

    /// True when the pattern has no wildcard
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.wildcard
    }

    /// The concrete path in front of the wildcard (or the path itself)
    #[must_use]
    pub fn prefix(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.segments.is_empty(), self.wildcard) {
            (true, true) => write!(f, "/*"),
            (true, false) => write!(f, "/"),
            (false, true) => write!(f, "/{}/*", self.segments.join("/")),
            (false, false) => write!(f, "/{}", self.segments.join("/")),
        }
    }
}

impl std::str::FromStr for Pattern {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pattern {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(value: Pattern) -> Self {
        value.to_string()
    }
}

/// Paired allow/deny pattern lists.
///
/// A path is permitted iff it matches some allow pattern and no deny
/// pattern. An empty allow list permits nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFilter {
    allow: Vec<Pattern>,
    deny: Vec<Pattern>,
}

impl PathFilter {
    /// Create an empty filter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter permitting every path
    #[must_use]
    pub fn everything() -> Self {
        Self::new().allow(Pattern::everything())
    }

    /// Build from textual allow and deny lists
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for the first unparsable pattern
    pub fn from_lists<A, D>(allow: A, deny: D) -> CoreResult<Self>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let mut filter = Self::new();
        for p in allow {
            filter.allow.push(Pattern::parse(p.as_ref())?);
        }
        for p in deny {
            filter.deny.push(Pattern::parse(p.as_ref())?);
        }
        Ok(filter)
    }

    /// Add an allow pattern
    #[must_use]
    pub fn allow(mut self, pattern: Pattern) -> Self {
        self.allow.push(pattern);
        self
    }

    /// Add a deny pattern
    #[must_use]
    pub fn deny(mut self, pattern: Pattern) -> Self {
        self.deny.push(pattern);
        self
    }

    /// Is the concrete path eligible?
    #[must_use]
    pub fn permits(&self, path: &str) -> bool {
        self.allow.iter().any(|p| p.matches(path)) && !self.deny.iter().any(|p| p.matches(path))
    }

    /// Allow patterns
    #[must_use]
    pub fn allowed(&self) -> &[Pattern] {
        &self.allow
    }

    /// Deny patterns
    #[must_use]
    pub fn denied(&self) -> &[Pattern] {
        &self.deny
    }

    /// True when nothing is allowed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pat(s: &str) -> Pattern {
        Pattern::parse(s).unwrap()
    }

    #[test]
    fn test_wildcard_matches_subtree() {
        let p = pat("/jobs/*");
        assert!(p.matches("/jobs/counter/job"));
        assert!(p.matches("/jobs/x"));
        assert!(p.matches("/jobs"));
        assert!(!p.matches("/components/x"));
        assert!(!p.matches("/jobsx"));
    }

    #[test]
    fn test_exact_matches_only_itself() {
        let p = pat("/jobs/counter/job");
        assert!(p.matches("/jobs/counter/job"));
        assert!(!p.matches("/jobs/counter"));
        assert!(!p.matches("/jobs/counter/job/extra"));
        assert!(p.is_exact());
    }

    #[test]
    fn test_root_wildcard_matches_everything() {
        let p = pat("/*");
        assert!(p.matches("/"));
        assert!(p.matches("/a"));
        assert!(p.matches("/a/b/c"));
        assert_eq!(p, Pattern::everything());
    }

    #[test]
    fn test_matching_ignores_redundant_slashes() {
        let p = pat("/jobs/*");
        assert!(p.matches("//jobs//counter/"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(Pattern::parse("jobs/*").is_err());
        assert!(Pattern::parse("/jobs/*/x").is_err());
        assert!(Pattern::parse("/jo*bs").is_err());
    }

    #[test]
    fn test_pattern_display_roundtrip() {
        for s in ["/", "/*", "/jobs", "/jobs/*", "/a/b/c"] {
            assert_eq!(pat(s).to_string(), s);
        }
        assert_eq!(pat("/jobs/*").prefix(), "/jobs");
        assert_eq!(pat("/*").prefix(), "/");
    }

    #[test]
    fn test_filter_allow_and_deny() {
        let filter =
            PathFilter::from_lists(["/jobs/*", "/products/*"], ["/jobs/private/*"]).unwrap();
        assert!(filter.permits("/jobs/counter"));
        assert!(filter.permits("/products/counter/last_string"));
        assert!(!filter.permits("/jobs/private/key"));
        assert!(!filter.permits("/components/a"));
    }

    #[test]
    fn test_empty_filter_permits_nothing() {
        let filter = PathFilter::new();
        assert!(filter.is_empty());
        assert!(!filter.permits("/anything"));
        assert!(PathFilter::everything().permits("/anything"));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("a//b/"), "/a/b");
        assert_eq!(join_path("/", "jobs"), "/jobs");
        assert_eq!(join_path("/jobs", "counter"), "/jobs/counter");
        assert_eq!(parent_path("/jobs/counter").as_deref(), Some("/jobs"));
        assert_eq!(parent_path("/jobs").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_pattern_serde_as_string() {
        let json = serde_json::to_string(&pat("/jobs/*")).unwrap();
        assert_eq!(json, "\"/jobs/*\"");
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pat("/jobs/*"));
    }

    proptest! {
        #[test]
        fn prop_wildcard_matches_any_extension(
            prefix in proptest::collection::vec("[a-z]{1,6}", 0..4),
            suffix in proptest::collection::vec("[a-z]{1,6}", 0..4),
        ) {
            let pattern = pat(&format!("/{}/*", prefix.join("/")));
            let mut all = prefix.clone();
            all.extend(suffix);
            let path = format!("/{}", all.join("/"));
            prop_assert!(pattern.matches(&path));
        }

        #[test]
        fn prop_exact_pattern_matches_itself(
            segs in proptest::collection::vec("[a-z]{1,6}", 1..5),
        ) {
            let path = format!("/{}", segs.join("/"));
            prop_assert!(Pattern::exact(&path).matches(&path));
            let longer = format!("{}/extra", path);
            prop_assert!(!Pattern::exact(&path).matches(&longer));
        }
    }
}
