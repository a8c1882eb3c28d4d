//! Structure discovery over schema-less JSON documents
//!
//! Walks a document depth-first and reports every distinct path reachable
//! through object properties and array elements. Array indices are folded
//! into a single `name[]` segment, so a path's type and sample come from the
//! first value that reached it.
//!
//! Object keys that cannot be written as a path segment (empty, containing
//! `.`, `[` or `]`, or with surrounding whitespace) are skipped together with
//! everything below them, so every reported path parses back to itself.
//!
//! The progressive variant sends each newly discovered path over a channel
//! as soon as it is found, followed by exactly one completion event.

use crate::document::load_document;
use crate::path::{PathExpression, Segment};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::thread::JoinHandle;
use tracing::{debug, warn};

const SAMPLE_MAX_CHARS: usize = 50;
const SAMPLE_KEEP_CHARS: usize = 47;

/// Primitive type observed at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Boolean,
    Null,
    Object,
    Array,
}

impl JsonType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
            JsonType::Object => "object",
            JsonType::Array => "array",
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered path with its inferred type and a sample value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPathInfo {
    pub path: String,
    pub data_type: JsonType,
    pub sample: String,
}

/// Notification sent by the progressive analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalysisEvent {
    PathDiscovered(JsonPathInfo),
    Complete { paths: usize },
    /// The document could not be loaded; no path events were sent
    Failed { message: String },
}

/// Configuration for the structure walk
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    /// Paths longer than this many segments are not entered
    pub max_depth: usize,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        AnalyzeConfig { max_depth: 64 }
    }
}

/// Walks JSON values and reports their distinct paths
#[derive(Debug, Clone, Default)]
pub struct StructureAnalyzer {
    config: AnalyzeConfig,
}

/// A pending step of the walk. `Node` reports its own path before
/// descending; `Contents` only descends (array elements share the path of
/// the array that holds them).
enum Frame<'a> {
    Node(&'a Value, PathExpression),
    Contents(&'a Value, PathExpression),
}

impl StructureAnalyzer {
    pub fn new(config: AnalyzeConfig) -> Self {
        StructureAnalyzer { config }
    }

    /// Collect every distinct path in discovery order
    pub fn analyze(&self, document: &Value) -> Vec<JsonPathInfo> {
        let mut paths = Vec::new();
        self.walk(document, |info| paths.push(info));
        paths
    }

    /// Send each distinct path as it is discovered, then one `Complete`.
    ///
    /// A disconnected receiver does not stop the walk.
    pub fn analyze_progressive(&self, document: &Value, events: &Sender<AnalysisEvent>) -> usize {
        let mut count = 0;
        self.walk(document, |info| {
            count += 1;
            events.send(AnalysisEvent::PathDiscovered(info)).ok();
        });
        events.send(AnalysisEvent::Complete { paths: count }).ok();
        debug!(paths = count, "structure analysis complete");
        count
    }

    fn walk<'a>(&self, document: &'a Value, mut emit: impl FnMut(JsonPathInfo)) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack = vec![Frame::Contents(document, PathExpression::root())];

        while let Some(frame) = stack.pop() {
            let (value, path) = match frame {
                Frame::Node(value, path) => {
                    let rendered = path.to_string();
                    if !seen.contains(&rendered) {
                        seen.insert(rendered.clone());
                        emit(JsonPathInfo {
                            path: rendered,
                            data_type: JsonType::of(value),
                            sample: sample_of(value),
                        });
                    }
                    (value, path)
                }
                Frame::Contents(value, path) => (value, path),
            };

            if path.len() >= self.config.max_depth {
                continue;
            }

            // Children are pushed in reverse so they pop in document order
            match value {
                Value::Object(map) => {
                    for (key, child) in map.iter().rev() {
                        if !Segment::is_valid_name(key) {
                            debug!(key = %key, at = %path, "skipping key that is not addressable by a path");
                            continue;
                        }
                        let segment = if child.is_array() {
                            Segment::array(key.as_str())
                        } else {
                            Segment::key(key.as_str())
                        };
                        stack.push(Frame::Node(child, path.child(segment)));
                    }
                }
                Value::Array(items) => {
                    for item in items.iter().rev() {
                        stack.push(Frame::Contents(item, path.clone()));
                    }
                }
                _ => {}
            }
        }
    }
}

/// JSON text of `value`, shortened to 47 characters plus `...` when longer
/// than 50 characters
pub fn sample_of(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > SAMPLE_MAX_CHARS {
        let truncated: String = text.chars().take(SAMPLE_KEEP_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

/// Load `json_path` on a background thread and stream its paths to `events`.
///
/// A load or parse failure is reported as a single `Failed` event.
pub fn spawn_structure_analysis(
    json_path: impl Into<PathBuf>,
    events: Sender<AnalysisEvent>,
) -> JoinHandle<()> {
    let json_path = json_path.into();
    std::thread::spawn(move || match load_document(&json_path) {
        Ok(document) => {
            StructureAnalyzer::default().analyze_progressive(&document, &events);
        }
        Err(e) => {
            warn!(path = %json_path.display(), error = %e, "structure analysis failed");
            events
                .send(AnalysisEvent::Failed {
                    message: e.to_string(),
                })
                .ok();
        }
    })
}
