//! Path expressions over JSON documents
//!
//! A path is a dot-separated list of property names, any of which may end in
//! `[]` to mark an array whose elements are expanded, e.g.
//! `data.regions[].cities[]`. The empty path denotes the document root.

pub mod extract;

pub use extract::{extract_records, lookup, RecordExtractor, Window};

use crate::error::{IngotError, Result};
use std::fmt;
use std::str::FromStr;

const ARRAY_MARKER: &str = "[]";

/// One step of a path: a property name, optionally expanded as an array
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub name: String,
    pub is_array: bool,
}

impl Segment {
    pub fn key(name: impl Into<String>) -> Self {
        Segment {
            name: name.into(),
            is_array: false,
        }
    }

    pub fn array(name: impl Into<String>) -> Self {
        Segment {
            name: name.into(),
            is_array: true,
        }
    }

    /// Whether `name` renders to a segment that parses back to itself:
    /// non-empty, no `.`, `[` or `]`, no surrounding whitespace.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && name.trim() == name && !name.contains(['.', '[', ']'])
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "{}{}", self.name, ARRAY_MARKER)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Parsed, ordered list of path segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathExpression {
    segments: Vec<Segment>,
}

impl PathExpression {
    /// The empty path, addressing the document root
    pub fn root() -> Self {
        PathExpression::default()
    }

    /// Parse the rendered form. Every segment must have a non-empty name.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(PathExpression::root());
        }

        let mut segments = Vec::new();
        for part in input.split('.') {
            let (name, is_array) = match part.strip_suffix(ARRAY_MARKER) {
                Some(name) => (name, true),
                None => (part, false),
            };
            if !Segment::is_valid_name(name) {
                return Err(IngotError::InvalidPath(input.to_string()));
            }
            segments.push(Segment {
                name: name.to_string(),
                is_array,
            });
        }

        Ok(PathExpression { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of array expansion points along the path
    pub fn array_depth(&self) -> usize {
        self.segments.iter().filter(|s| s.is_array).count()
    }

    /// Extend the path by one segment
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        PathExpression { segments }
    }

    /// Strip `prefix` from the front of this path, if it is a prefix
    pub fn strip_prefix(&self, prefix: &PathExpression) -> Option<PathExpression> {
        if prefix.len() > self.len() || self.segments[..prefix.len()] != prefix.segments[..] {
            return None;
        }
        Some(PathExpression {
            segments: self.segments[prefix.len()..].to_vec(),
        })
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for PathExpression {
    type Err = IngotError;

    fn from_str(s: &str) -> Result<Self> {
        PathExpression::parse(s)
    }
}

impl FromIterator<Segment> for PathExpression {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        PathExpression {
            segments: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_arrays() {
        let path = PathExpression::parse("data.regions[].cities[]").unwrap();

        assert_eq!(
            path.segments(),
            &[
                Segment::key("data"),
                Segment::array("regions"),
                Segment::array("cities"),
            ]
        );
        assert_eq!(path.array_depth(), 2);
        assert_eq!(path.to_string(), "data.regions[].cities[]");
    }

    #[test]
    fn test_empty_is_root() {
        let path = PathExpression::parse("").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "");
    }

    #[test]
    fn test_rejects_empty_segments() {
        assert!(PathExpression::parse("data..users").is_err());
        assert!(PathExpression::parse("data.[]").is_err());
        assert!(PathExpression::parse("users[0]").is_err());
        assert!(PathExpression::parse("data. users").is_err());
    }

    #[test]
    fn test_valid_segment_names() {
        assert!(Segment::is_valid_name("first name"));
        assert!(Segment::is_valid_name("id"));
        assert!(!Segment::is_valid_name(""));
        assert!(!Segment::is_valid_name("a.b"));
        assert!(!Segment::is_valid_name("tags[]"));
        assert!(!Segment::is_valid_name(" padded"));
    }

    #[test]
    fn test_strip_prefix() {
        let full = PathExpression::parse("data.users[].address.city").unwrap();
        let root = PathExpression::parse("data.users[]").unwrap();

        let relative = full.strip_prefix(&root).unwrap();
        assert_eq!(relative.to_string(), "address.city");

        let other = PathExpression::parse("data.groups[]").unwrap();
        assert!(full.strip_prefix(&other).is_none());
    }
}
