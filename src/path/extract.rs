//! Root-path expansion into a flat sequence of source records

use super::{PathExpression, Segment};
use crate::error::{IngotError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Offset/limit window applied after full expansion.
///
/// A `limit` of zero keeps every record after `offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    pub fn new(offset: usize, limit: usize) -> Self {
        Window { offset, limit }
    }

    pub fn apply<T>(&self, records: Vec<T>) -> Vec<T> {
        let take = if self.limit > 0 { self.limit } else { usize::MAX };
        records.into_iter().skip(self.offset).take(take).collect()
    }
}

/// Expands a root path into every concrete value it reaches
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    root: PathExpression,
    window: Window,
}

impl RecordExtractor {
    pub fn new(root: PathExpression) -> Self {
        RecordExtractor {
            root,
            window: Window::default(),
        }
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn root(&self) -> &PathExpression {
        &self.root
    }

    /// Expand the root path over `document` and apply the window.
    ///
    /// Records are borrowed from the document and returned in document
    /// order; nested array segments produce their cross product.
    pub fn extract<'a>(&self, document: &'a Value) -> Result<Vec<&'a Value>> {
        let records = if self.root.is_root() {
            match document {
                Value::Array(items) => items.iter().collect(),
                Value::Object(_) => vec![document],
                _ => return Err(IngotError::InvalidRoot),
            }
        } else {
            self.expand(document)?
        };

        Ok(self.window.apply(records))
    }

    fn expand<'a>(&self, document: &'a Value) -> Result<Vec<&'a Value>> {
        let segments = self.root.segments();
        let mut records = Vec::new();
        let mut stack: Vec<(&'a Value, usize)> = vec![(document, 0)];

        while let Some((value, position)) = stack.pop() {
            if position == segments.len() {
                records.push(value);
                continue;
            }

            let segment = &segments[position];
            let child = value
                .as_object()
                .and_then(|map| map.get(&segment.name))
                .ok_or_else(|| IngotError::MissingProperty {
                    segment: segment.name.clone(),
                    at: self.rendered_prefix(position),
                })?;

            if segment.is_array {
                let items = child.as_array().ok_or_else(|| IngotError::NotAnArray {
                    segment: segment.name.clone(),
                    at: self.rendered_prefix(position),
                })?;
                // Reversed so that popping preserves document order
                for item in items.iter().rev() {
                    stack.push((item, position + 1));
                }
            } else {
                stack.push((child, position + 1));
            }
        }

        Ok(records)
    }

    fn rendered_prefix(&self, position: usize) -> String {
        let prefix: PathExpression = self.root.segments()[..position].iter().cloned().collect();
        if prefix.is_root() {
            "$".to_string()
        } else {
            prefix.to_string()
        }
    }
}

/// Parse `root` and extract owned copies of the windowed records
pub fn extract_records(document: &Value, root: &str, window: Window) -> Result<Vec<Value>> {
    let extractor = RecordExtractor::new(PathExpression::parse(root)?).with_window(window);
    Ok(extractor.extract(document)?.into_iter().cloned().collect())
}

/// Resolve a record-relative path without failing.
///
/// Returns `None` when any key along the way is missing or when the value
/// under a non-final segment is not an object. An array segment resolves to
/// the array itself and must be the last segment.
pub fn lookup<'a>(record: &'a Value, path: &PathExpression) -> Option<&'a Value> {
    let mut current = record;
    let last = path.len().checked_sub(1)?;

    for (i, Segment { name, is_array }) in path.segments().iter().enumerate() {
        current = current.as_object()?.get(name)?;
        if *is_array && (i != last || !current.is_array()) {
            return None;
        }
    }

    Some(current)
}
