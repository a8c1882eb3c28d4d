//! Column value resolution for extracted records
//!
//! A record becomes a row by running an ordered pipeline of pure
//! `row -> row` stages:
//!
//! 1. **Mapping**: copy values found at record-relative JSON paths
//! 2. **Defaults**: fill columns that are still null or absent
//! 3. **Forced**: overwrite unconditionally
//! 4. **Templates**: overwrite with rendered dynamic templates
//! 5. **Backfill**: synthesize NOT NULL + UNIQUE columns left unresolved

pub mod kind;
pub mod rules;
pub mod template;

pub use kind::{ColumnKind, Synthesizer};
pub use rules::{RuleValue, ValueRules};
pub use template::{Template, DYNAMIC_SENTINEL};

use crate::db::TableInfo;
use crate::error::Result;
use crate::path::{lookup, PathExpression};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// Resolved column values for one record
pub type Row = IndexMap<String, Value>;

/// Record-relative JSON path → target column, in declaration order
pub type Mapping = IndexMap<String, String>;

/// One step of the resolution pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Mapping,
    Defaults,
    Forced,
    Templates,
    Backfill,
}

/// Stages of an import run
pub const IMPORT_PIPELINE: &[Stage] = &[
    Stage::Mapping,
    Stage::Defaults,
    Stage::Forced,
    Stage::Templates,
    Stage::Backfill,
];

/// Stages of an update run: only mapped values are written
pub const UPDATE_PIPELINE: &[Stage] = &[Stage::Mapping];

/// Turns extracted records into rows
#[derive(Debug, Clone)]
pub struct ValueResolver {
    mapping: IndexMap<String, PathExpression>,
    defaults: Vec<(String, RuleValue)>,
    forced: Vec<(String, RuleValue)>,
    templates: Vec<(String, Template)>,
    kinds: HashMap<String, ColumnKind>,
    backfill: Vec<String>,
    synthesizer: Synthesizer,
    stages: &'static [Stage],
}

impl ValueResolver {
    /// Build the full import pipeline against a live table definition
    pub fn new(
        mapping: &Mapping,
        rules: &ValueRules,
        table: &TableInfo,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        let kinds = table
            .columns
            .iter()
            .map(|c| (c.name.clone(), ColumnKind::classify(&c.data_type, &c.name)))
            .collect();

        Ok(ValueResolver {
            mapping: compile_mapping(mapping)?,
            defaults: rules
                .defaults
                .iter()
                .map(|(c, r)| (c.clone(), r.clone()))
                .collect(),
            forced: rules
                .forced
                .iter()
                .map(|(c, r)| (c.clone(), r.clone()))
                .collect(),
            templates: rules.templates()?,
            kinds,
            backfill: table
                .backfill_columns()
                .into_iter()
                .map(|c| c.name.clone())
                .collect(),
            synthesizer: Synthesizer::new(started_at),
            stages: IMPORT_PIPELINE,
        })
    }

    /// Build a resolver that only applies the mapping
    pub fn mapping_only(mapping: &Mapping) -> Result<Self> {
        Ok(ValueResolver {
            mapping: compile_mapping(mapping)?,
            defaults: Vec::new(),
            forced: Vec::new(),
            templates: Vec::new(),
            kinds: HashMap::new(),
            backfill: Vec::new(),
            synthesizer: Synthesizer::new(Utc::now()),
            stages: UPDATE_PIPELINE,
        })
    }

    /// Every column this resolver may produce, without duplicates
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        let candidates = self
            .mapping
            .keys()
            .chain(self.defaults.iter().map(|(c, _)| c))
            .chain(self.forced.iter().map(|(c, _)| c))
            .chain(self.templates.iter().map(|(c, _)| c))
            .chain(self.backfill.iter());
        for column in candidates {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
        columns
    }

    /// Columns filled from the JSON record
    pub fn mapped_columns(&self) -> impl Iterator<Item = &str> {
        self.mapping.keys().map(String::as_str)
    }

    /// Resolve the record at ordinal `index`
    pub fn resolve(&self, record: &Value, index: usize) -> Row {
        self.stages
            .iter()
            .fold(Row::new(), |row, stage| self.apply(*stage, row, record, index))
    }

    fn apply(&self, stage: Stage, mut row: Row, record: &Value, index: usize) -> Row {
        match stage {
            Stage::Mapping => {
                for (column, path) in &self.mapping {
                    if let Some(value) = lookup(record, path) {
                        row.insert(column.clone(), value.clone());
                    }
                }
            }
            Stage::Defaults => {
                for (column, rule) in &self.defaults {
                    if is_unresolved(&row, column) {
                        let value = self.rule_value(column, rule, index);
                        row.insert(column.clone(), value);
                    }
                }
            }
            Stage::Forced => {
                for (column, rule) in &self.forced {
                    let value = self.rule_value(column, rule, index);
                    row.insert(column.clone(), value);
                }
            }
            Stage::Templates => {
                for (column, template) in &self.templates {
                    row.insert(column.clone(), Value::String(template.render(index)));
                }
            }
            Stage::Backfill => {
                for column in &self.backfill {
                    if is_unresolved(&row, column) {
                        let value = self.synthesize(column, index);
                        row.insert(column.clone(), value);
                    }
                }
            }
        }
        row
    }

    fn rule_value(&self, column: &str, rule: &RuleValue, index: usize) -> Value {
        match rule {
            RuleValue::Literal(value) => value.clone(),
            RuleValue::Synthetic => self.synthesize(column, index),
        }
    }

    /// Synthetic value for `column`; columns unknown to the table use the
    /// generic fallback
    pub fn synthesize(&self, column: &str, index: usize) -> Value {
        let kind = self.kinds.get(column).copied().unwrap_or(ColumnKind::Other);
        self.synthesizer.generate(kind, column, index)
    }
}

fn is_unresolved(row: &Row, column: &str) -> bool {
    row.get(column).map_or(true, Value::is_null)
}

/// Index the mapping by column. When several paths target one column the
/// last one wins.
fn compile_mapping(mapping: &Mapping) -> Result<IndexMap<String, PathExpression>> {
    let mut compiled = IndexMap::new();
    for (path, column) in mapping {
        compiled.insert(column.clone(), PathExpression::parse(path)?);
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ColumnInfo;
    use chrono::TimeZone;
    use serde_json::json;

    fn column(name: &str, data_type: &str, not_null: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            not_null,
            primary_key: false,
            default_value: None,
        }
    }

    fn table() -> TableInfo {
        TableInfo {
            columns: vec![
                column("id", "INTEGER", true),
                column("name", "TEXT", false),
                column("email", "TEXT", false),
                column("source", "TEXT", false),
                column("ref", "TEXT", false),
                column("score", "REAL", false),
            ],
            unique_constraints: vec![vec!["id".to_string()]],
        }
    }

    fn started_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn mapping(pairs: &[(&str, &str)]) -> Mapping {
        pairs
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    fn rules(value: Value) -> ValueRules {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults_fill_null_names() {
        let resolver = ValueResolver::new(
            &mapping(&[("name", "name")]),
            &rules(json!({"defaults": {"name": "unknown"}})),
            &table(),
            started_at(),
        )
        .unwrap();

        let first = resolver.resolve(&json!({"name": "A"}), 0);
        let second = resolver.resolve(&json!({"name": null}), 1);

        assert_eq!(first["name"], json!("A"));
        assert_eq!(second["name"], json!("unknown"));
    }

    #[test]
    fn test_missing_paths_leave_column_absent() {
        let resolver = ValueResolver::new(
            &mapping(&[("contact.email", "email")]),
            &ValueRules::default(),
            &table(),
            started_at(),
        )
        .unwrap();

        let row = resolver.resolve(&json!({"name": "A"}), 0);
        assert!(!row.contains_key("email"));

        let row = resolver.resolve(&json!({"contact": {"email": "a@b.c"}}), 1);
        assert_eq!(row["email"], json!("a@b.c"));
    }

    #[test]
    fn test_forced_always_wins() {
        let resolver = ValueResolver::new(
            &mapping(&[("origin", "source")]),
            &rules(json!({
                "defaults": {"source": "fallback"},
                "forced": {"source": "import"}
            })),
            &table(),
            started_at(),
        )
        .unwrap();

        for record in [json!({"origin": "api"}), json!({"origin": null}), json!({})] {
            assert_eq!(resolver.resolve(&record, 0)["source"], json!("import"));
        }
    }

    #[test]
    fn test_templates_overwrite_forced() {
        let resolver = ValueResolver::new(
            &Mapping::new(),
            &rules(json!({
                "forced": {"ref": "constant"},
                "dynamic": {"ref": "REF-{{INDEX}}"}
            })),
            &table(),
            started_at(),
        )
        .unwrap();

        assert_eq!(resolver.resolve(&json!({}), 4)["ref"], json!("REF-4"));
    }

    #[test]
    fn test_dynamic_rules_use_column_kind() {
        let resolver = ValueResolver::new(
            &Mapping::new(),
            &rules(json!({
                "defaults": {"email": "{{DYNAMIC}}"},
                "forced": {"name": "{{DYNAMIC}}", "unknown_col": "{{DYNAMIC}}"}
            })),
            &table(),
            started_at(),
        )
        .unwrap();

        let row = resolver.resolve(&json!({}), 2);
        assert_eq!(row["email"], json!("user2@example.com"));
        assert_eq!(row["name"], json!("Name_2"));
        assert_eq!(row["unknown_col"], json!("unknown_col_2"));
    }

    #[test]
    fn test_backfill_not_null_unique_columns() {
        let resolver =
            ValueResolver::new(&Mapping::new(), &ValueRules::default(), &table(), started_at())
                .unwrap();

        let ids: Vec<Value> = (0..5)
            .map(|i| resolver.resolve(&json!({}), i)["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(1000), json!(1001), json!(1002), json!(1003), json!(1004)]);

        let mapped = ValueResolver::new(
            &mapping(&[("id", "id")]),
            &ValueRules::default(),
            &table(),
            started_at(),
        )
        .unwrap();
        assert_eq!(mapped.resolve(&json!({"id": 7}), 0)["id"], json!(7));
    }

    #[test]
    fn test_last_mapping_for_a_column_wins() {
        let resolver = ValueResolver::new(
            &mapping(&[("first", "name"), ("second", "name")]),
            &ValueRules::default(),
            &table(),
            started_at(),
        )
        .unwrap();

        let row = resolver.resolve(&json!({"first": "a", "second": "b"}), 0);
        assert_eq!(row["name"], json!("b"));

        let row = resolver.resolve(&json!({"first": "a"}), 0);
        assert!(!row.contains_key("name"));
    }

    #[test]
    fn test_nested_values_kept_as_json() {
        let resolver = ValueResolver::mapping_only(&mapping(&[("tags[]", "source")])).unwrap();

        let row = resolver.resolve(&json!({"tags": ["x", "y"]}), 0);
        assert_eq!(row["source"], json!(["x", "y"]));
    }

    #[test]
    fn test_columns_union() {
        let resolver = ValueResolver::new(
            &mapping(&[("n", "name")]),
            &rules(json!({
                "defaults": {"name": "x", "email": "y"},
                "dynamic": {"ref": "{{UUID}}"}
            })),
            &table(),
            started_at(),
        )
        .unwrap();

        assert_eq!(resolver.columns(), vec!["name", "email", "ref", "id"]);
    }

    #[test]
    fn test_mapping_only_skips_rules() {
        let resolver = ValueResolver::mapping_only(&mapping(&[("k", "id")])).unwrap();
        let row = resolver.resolve(&json!({"k": 3, "other": 1}), 0);

        assert_eq!(row.len(), 1);
        assert_eq!(row["id"], json!(3));
    }
}
