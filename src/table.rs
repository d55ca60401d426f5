//! Tabular input for the analysis pipeline
//!
//! A [`Table`] is a set of named numeric columns sharing one unique index.
//! Index labels are the unit identifiers used throughout the report.
//!
//! Tables are read from the JSON "split" orientation:
//!
//! ```json
//! { "index": ["a", "b"], "columns": ["Treatment", "Outcome"], "data": [[1.0, 2.0], [2.0, 4.0]] }
//! ```
//!
//! `null` cells load as `NaN`; feature preparation rejects them with
//! `NonFiniteFeature`.

use crate::error::{Result, VaineError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Immutable column-major table with a unique row index
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index: Vec<String>,
    columns: Vec<String>,
    /// One vector per column, each `index.len()` long
    values: Vec<Vec<f64>>,
}

/// Serialized form of a [`Table`] (pandas `orient="split"`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitTable {
    pub index: Vec<serde_json::Value>,
    pub columns: Vec<String>,
    pub data: Vec<Vec<Option<f64>>>,
}

impl Table {
    /// Build a table from named columns
    ///
    /// # Errors
    /// `InvalidTable` for duplicate index labels or column names,
    /// `ShapeMismatch` when a column's length differs from the index.
    pub fn new(index: Vec<String>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let mut seen = HashSet::new();
        for label in &index {
            if !seen.insert(label.as_str()) {
                return Err(VaineError::InvalidTable(format!(
                    "duplicate index label '{}'",
                    label
                )));
            }
        }

        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        let mut seen_names = HashSet::new();
        for (name, column) in columns {
            if !seen_names.insert(name.clone()) {
                return Err(VaineError::InvalidTable(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
            if column.len() != index.len() {
                return Err(VaineError::ShapeMismatch {
                    expected: index.len(),
                    actual: column.len(),
                });
            }
            names.push(name);
            values.push(column);
        }

        Ok(Self {
            index,
            columns: names,
            values,
        })
    }

    /// Build a table whose index is the row position (`"0"`, `"1"`, ...)
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let index = (0..n_rows).map(|i| i.to_string()).collect();
        Self::new(index, columns)
    }

    /// Convert from the split orientation
    pub fn from_split(split: SplitTable) -> Result<Self> {
        let n_cols = split.columns.len();
        if split.data.len() != split.index.len() {
            return Err(VaineError::ShapeMismatch {
                expected: split.index.len(),
                actual: split.data.len(),
            });
        }

        let mut values = vec![Vec::with_capacity(split.data.len()); n_cols];
        for row in &split.data {
            if row.len() != n_cols {
                return Err(VaineError::InvalidTable(format!(
                    "ragged row: expected {} cells, got {}",
                    n_cols,
                    row.len()
                )));
            }
            for (column, cell) in values.iter_mut().zip(row) {
                column.push(cell.unwrap_or(f64::NAN));
            }
        }

        let index = split
            .index
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();

        Self::new(index, split.columns.into_iter().zip(values).collect())
    }

    /// Parse a JSON document in the split orientation
    pub fn from_json_str(json: &str) -> Result<Self> {
        let split: SplitTable =
            serde_json::from_str(json).map_err(|e| VaineError::InvalidTable(e.to_string()))?;
        Self::from_split(split)
    }

    /// Number of rows (units)
    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    /// Row labels
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Column names in table order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Values of one column
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i].as_slice())
            .ok_or_else(|| VaineError::UnknownColumn(name.to_string()))
    }

    /// Copy of this table without the named columns (unknown names are ignored)
    pub fn drop_columns(&self, names: &[String]) -> Self {
        let (columns, values): (Vec<String>, Vec<Vec<f64>>) = self
            .columns
            .iter()
            .zip(&self.values)
            .filter(|(c, _)| !names.contains(c))
            .map(|(c, v)| (c.clone(), v.clone()))
            .unzip();

        Self {
            index: self.index.clone(),
            columns,
            values,
        }
    }

    /// Copy of this table restricted to `names`, in the given order
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            values.push(self.column(name)?.to_vec());
        }
        Ok(Self {
            index: self.index.clone(),
            columns: names.to_vec(),
            values,
        })
    }

    /// Row-major copy of the given columns (`n_rows x names.len()`)
    pub fn rows(&self, names: &[String]) -> Result<Vec<Vec<f64>>> {
        let columns = names
            .iter()
            .map(|n| self.column(n))
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.n_rows())
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect())
    }
}

/// Caller-supplied column selection: a regex or an explicit list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelector {
    Pattern(String),
    List(Vec<String>),
}

impl From<&str> for ColumnSelector {
    fn from(pattern: &str) -> Self {
        ColumnSelector::Pattern(pattern.to_string())
    }
}

impl From<Vec<String>> for ColumnSelector {
    fn from(list: Vec<String>) -> Self {
        ColumnSelector::List(list)
    }
}

/// Resolve a selector against the available column names
///
/// Patterns match from the start of a column name, so `Outcome` selects
/// `Outcome.1` but not `PrimaryOutcome`. Results keep the order of
/// `available` for patterns and the caller's order for lists.
///
/// # Errors
/// * `AmbiguousColumnFilter` when a pattern matches nothing
/// * `UnknownColumn` when a list names a column that does not exist
/// * `InvalidPattern` when the pattern is not a valid regex
pub fn resolve_columns(selector: &ColumnSelector, available: &[String]) -> Result<Vec<String>> {
    match selector {
        ColumnSelector::Pattern(pattern) => {
            let re = Regex::new(pattern).map_err(|e| VaineError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;

            let matched: Vec<String> = available
                .iter()
                .filter(|name| re.find(name).is_some_and(|m| m.start() == 0))
                .cloned()
                .collect();

            if matched.is_empty() {
                return Err(VaineError::AmbiguousColumnFilter {
                    pattern: pattern.clone(),
                });
            }
            Ok(matched)
        }
        ColumnSelector::List(names) => {
            let mut resolved: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                if !available.contains(name) {
                    return Err(VaineError::UnknownColumn(name.clone()));
                }
                if !resolved.contains(name) {
                    resolved.push(name.clone());
                }
            }
            Ok(resolved)
        }
    }
}
