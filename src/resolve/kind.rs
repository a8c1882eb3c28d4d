//! Logical column kinds and type-directed synthetic values
//!
//! A column's kind is derived once from its declared SQL type and, for text
//! columns, from its name. Each kind has exactly one generator.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::{Number, Value};

// Declared-type patterns follow SQLite's affinity rules loosely
static INTEGER_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)int").unwrap());

static TEXT_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)char|clob|text").unwrap());

static FLOAT_TYPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)real|floa|doub|numeric|decimal").unwrap());

static DATETIME_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)date|time").unwrap());

static BOOLEAN_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)bool").unwrap());

static IDENTIFIER_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)id|code").unwrap());

static EMAIL_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)e-?mail").unwrap());

static NAME_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)name").unwrap());

static TITLE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)title").unwrap());

static DESCRIPTION_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)description").unwrap());

/// Logical kind of a target column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Integer,
    Text,
    Identifier,
    Email,
    Name,
    Float,
    DateTime,
    Boolean,
    Other,
}

impl ColumnKind {
    /// Classify a column from its declared type and name
    pub fn classify(declared_type: &str, column: &str) -> Self {
        if INTEGER_TYPE_REGEX.is_match(declared_type) {
            ColumnKind::Integer
        } else if TEXT_TYPE_REGEX.is_match(declared_type) {
            if IDENTIFIER_NAME_REGEX.is_match(column) {
                ColumnKind::Identifier
            } else if EMAIL_NAME_REGEX.is_match(column) {
                ColumnKind::Email
            } else if NAME_NAME_REGEX.is_match(column) {
                ColumnKind::Name
            } else {
                ColumnKind::Text
            }
        } else if FLOAT_TYPE_REGEX.is_match(declared_type) {
            ColumnKind::Float
        } else if DATETIME_TYPE_REGEX.is_match(declared_type) {
            ColumnKind::DateTime
        } else if BOOLEAN_TYPE_REGEX.is_match(declared_type) {
            ColumnKind::Boolean
        } else {
            ColumnKind::Other
        }
    }
}

/// Generates synthetic values for one run.
///
/// The run start time is captured once so that identifier and date values
/// depend only on the column and the record index.
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer {
    started_at: DateTime<Utc>,
}

impl Synthesizer {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Synthesizer { started_at }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn generate(&self, kind: ColumnKind, column: &str, index: usize) -> Value {
        match kind {
            ColumnKind::Integer => integer_value(index),
            ColumnKind::Identifier => self.identifier_value(column, index),
            ColumnKind::Email => email_value(index),
            ColumnKind::Name => name_value(index),
            ColumnKind::Text => text_value(column, index),
            ColumnKind::Float => float_value(),
            ColumnKind::DateTime => self.date_value(index),
            ColumnKind::Boolean => boolean_value(index),
            ColumnKind::Other => other_value(column, index),
        }
    }

    fn identifier_value(&self, column: &str, index: usize) -> Value {
        let prefix: String = column.chars().take(3).collect::<String>().to_uppercase();
        Value::String(format!(
            "{}_{}_{}",
            prefix,
            self.started_at.timestamp_millis(),
            index
        ))
    }

    fn date_value(&self, index: usize) -> Value {
        let date = i64::try_from(index)
            .ok()
            .and_then(Duration::try_days)
            .and_then(|offset| self.started_at.checked_add_signed(offset))
            .unwrap_or(self.started_at);
        Value::String(date.format("%Y-%m-%d").to_string())
    }
}

fn integer_value(index: usize) -> Value {
    Value::Number((index as u64 + 1000).into())
}

fn email_value(index: usize) -> Value {
    Value::String(format!("user{}@example.com", index))
}

fn name_value(index: usize) -> Value {
    Value::String(format!("Name_{}", index))
}

fn text_value(column: &str, index: usize) -> Value {
    if TITLE_NAME_REGEX.is_match(column) {
        Value::String(format!("Title {}", index))
    } else if DESCRIPTION_NAME_REGEX.is_match(column) {
        Value::String(format!("Description for item {}", index))
    } else {
        let salt: u32 = rand::thread_rng().gen();
        Value::String(format!("{}_{:x}_{}", column, salt, index))
    }
}

fn float_value() -> Value {
    let value = rand::thread_rng().gen_range(0.0..100.0);
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn boolean_value(index: usize) -> Value {
    Value::Bool(index % 2 == 0)
}

fn other_value(column: &str, index: usize) -> Value {
    Value::String(format!("{}_{}", column, index))
}
