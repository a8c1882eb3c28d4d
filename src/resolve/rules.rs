use super::template::{Template, DYNAMIC_SENTINEL};
use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Value of a `defaults` or `forced` rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum RuleValue {
    /// Written as-is
    Literal(Value),
    /// `{{DYNAMIC}}`: generated from the column's kind and the record index
    Synthetic,
}

impl From<Value> for RuleValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(ref s) if s == DYNAMIC_SENTINEL => RuleValue::Synthetic,
            other => RuleValue::Literal(other),
        }
    }
}

impl From<RuleValue> for Value {
    fn from(rule: RuleValue) -> Self {
        match rule {
            RuleValue::Literal(value) => value,
            RuleValue::Synthetic => Value::String(DYNAMIC_SENTINEL.to_string()),
        }
    }
}

/// Fallback and override rules, each keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRules {
    /// Applied only where the mapped value is null or absent
    #[serde(default, deserialize_with = "null_as_empty")]
    pub defaults: IndexMap<String, RuleValue>,

    /// Always applied, replacing mapped and default values
    #[serde(default, deserialize_with = "null_as_empty")]
    pub forced: IndexMap<String, RuleValue>,

    /// Templates rendered per record, applied after forced values
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dynamic: IndexMap<String, String>,
}

impl ValueRules {
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.forced.is_empty() && self.dynamic.is_empty()
    }

    /// Every column named by any rule, without duplicates
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        let mut seen = std::collections::HashSet::new();
        self.defaults
            .keys()
            .chain(self.forced.keys())
            .chain(self.dynamic.keys())
            .filter(move |c| seen.insert(c.as_str()))
            .map(String::as_str)
    }

    /// Parse every dynamic template
    pub fn templates(&self) -> Result<Vec<(String, Template)>> {
        self.dynamic
            .iter()
            .map(|(column, source)| Ok((column.clone(), Template::parse(column, source)?)))
            .collect()
    }
}

/// Rule maps may be sent as `null` when empty
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
