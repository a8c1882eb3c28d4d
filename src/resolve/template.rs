//! Per-record string templates (`{{INDEX}}`, `{{UUID}}`, `{{TIMESTAMP}}`)

use crate::error::{IngotError, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// Sentinel for type-directed synthetic values in defaults and forced rules
pub const DYNAMIC_SENTINEL: &str = "{{DYNAMIC}}";

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(INDEX|UUID|TIMESTAMP|DYNAMIC)\}\}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Index,
    Uuid,
    Timestamp,
}

/// A parsed dynamic template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    /// Parse `source` for `column`. `{{DYNAMIC}}` is rejected; any other
    /// brace text is kept literally.
    pub fn parse(column: &str, source: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut last = 0;

        for captures in PLACEHOLDER_REGEX.captures_iter(source) {
            let (Some(whole), Some(token)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Literal(source[last..whole.start()].to_string()));
            }
            parts.push(match token.as_str() {
                "INDEX" => Part::Index,
                "UUID" => Part::Uuid,
                "TIMESTAMP" => Part::Timestamp,
                _ => {
                    return Err(IngotError::InvalidTemplate {
                        column: column.to_string(),
                        reason: format!("{} is only valid in default or forced rules", DYNAMIC_SENTINEL),
                    })
                }
            });
            last = whole.end();
        }

        if last < source.len() {
            parts.push(Part::Literal(source[last..].to_string()));
        }

        Ok(Template { parts })
    }

    /// Substitute every placeholder for the record at `index`.
    ///
    /// Each `{{UUID}}` occurrence gets its own identifier; `{{TIMESTAMP}}` is
    /// the current Unix time in milliseconds.
    pub fn render(&self, index: usize) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Index => out.push_str(&index.to_string()),
                Part::Uuid => out.push_str(&Uuid::new_v4().to_string()),
                Part::Timestamp => out.push_str(&Utc::now().timestamp_millis().to_string()),
            }
        }
        out
    }

    pub fn is_constant(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }
}
