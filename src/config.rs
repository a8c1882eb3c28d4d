//! Run configuration for imports and keyed updates
//!
//! Both configs are plain serde structs, usually read from a JSON file and
//! then adjusted by command-line flags. A config is validated once, before
//! any file or database is touched, and is immutable for the rest of the
//! run.

use crate::error::{IngotError, Result};
use crate::path::{PathExpression, Window};
use crate::progress::DEFAULT_PROGRESS_INTERVAL;
use crate::resolve::{Mapping, ValueRules};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

/// Configuration of an import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub json_path: PathBuf,
    pub db_path: PathBuf,
    /// Root path whose expansion yields the source records
    #[serde(default)]
    pub json_root: String,
    pub table_name: String,
    /// Record-relative JSON path → column
    #[serde(default)]
    pub mapping: Mapping,
    #[serde(flatten)]
    pub rules: ValueRules,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    /// Rows between progress snapshots
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

/// Configuration of a keyed update run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub json_path: PathBuf,
    pub db_path: PathBuf,
    #[serde(default)]
    pub json_root: String,
    pub table_name: String,
    /// Column used to find the existing row
    pub key_column: String,
    /// Columns the update may write
    pub update_columns: Vec<String>,
    #[serde(default)]
    pub mapping: Mapping,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl ImportConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        read_config(path.as_ref())
    }

    pub fn root(&self) -> Result<PathExpression> {
        PathExpression::parse(&self.json_root)
    }

    pub fn window(&self) -> Window {
        window(self.offset, self.limit)
    }

    /// Mapping with any root prefix removed from its paths
    pub fn relative_mapping(&self) -> Result<Mapping> {
        relative_mapping(&self.root()?, &self.mapping)
    }

    /// Check everything that does not need the document or the database
    pub fn validate(&self) -> Result<()> {
        self.relative_mapping()?;
        self.rules.templates()?;
        Ok(())
    }
}

impl UpdateConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        read_config(path.as_ref())
    }

    pub fn root(&self) -> Result<PathExpression> {
        PathExpression::parse(&self.json_root)
    }

    pub fn window(&self) -> Window {
        window(self.offset, self.limit)
    }

    pub fn relative_mapping(&self) -> Result<Mapping> {
        relative_mapping(&self.root()?, &self.mapping)
    }

    /// The key column must be mapped and at least one column must be
    /// updatable
    pub fn validate(&self) -> Result<()> {
        self.relative_mapping()?;
        if self.update_columns.is_empty() {
            return Err(IngotError::NoUpdateColumns);
        }
        if !self.mapping.values().any(|c| c == &self.key_column) {
            return Err(IngotError::KeyColumnNotMapped(self.key_column.clone()));
        }
        Ok(())
    }
}

fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| IngotError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| IngotError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn window(offset: Option<usize>, limit: Option<usize>) -> Window {
    Window::new(offset.unwrap_or(0), limit.unwrap_or(0))
}

/// Rewrite mapping paths written from the document root (`data.users[].name`)
/// into record-relative paths (`name`). Paths that do not start with the
/// root are kept as they are.
fn relative_mapping(root: &PathExpression, mapping: &Mapping) -> Result<Mapping> {
    let mut relative = Mapping::new();
    for (path, column) in mapping {
        let parsed = PathExpression::parse(path)?;
        let rendered = match parsed.strip_prefix(root) {
            Some(rest) if !root.is_root() && !rest.is_root() => rest.to_string(),
            _ => parsed.to_string(),
        };
        relative.insert(rendered, column.clone());
    }
    Ok(relative)
}
