//! Row-aligned table of named numeric columns.

use crate::detect::DetectError;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A batch of records stored column-wise. Every column has the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    columns: Vec<(String, Vec<f64>)>,
    n_rows: usize,
}

impl FeatureTable {
    /// Build a table from `(name, values)` pairs, keeping their order.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, DetectError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Build a table by pulling `fields` out of loosely-typed JSON records.
    ///
    /// Numbers are taken as-is and strings are parsed as `f64`. A field that is
    /// absent or `null` in any record is reported as missing.
    pub fn from_records(
        records: &[Map<String, Value>],
        fields: &[String],
    ) -> Result<Self, DetectError> {
        let mut table = Self::default();
        for field in fields {
            let mut values = Vec::with_capacity(records.len());
            for (row, record) in records.iter().enumerate() {
                let value = match record.get(field) {
                    None | Some(Value::Null) => {
                        return Err(DetectError::MissingFeature {
                            feature: field.clone(),
                        })
                    }
                    Some(Value::Number(n)) => n.as_f64(),
                    Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                    Some(_) => None,
                };
                let value = value.ok_or_else(|| DetectError::NonNumeric {
                    feature: field.clone(),
                    row,
                })?;
                values.push(value);
            }
            table.push_column(field.clone(), values)?;
        }
        if fields.is_empty() {
            table.n_rows = records.len();
        }
        Ok(table)
    }

    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), DetectError> {
        let name = name.into();
        if self.column(&name).is_some() {
            return Err(DetectError::DuplicateFeature { feature: name });
        }
        if self.columns.is_empty() {
            self.n_rows = values.len();
        } else if values.len() != self.n_rows {
            return Err(DetectError::RaggedColumns {
                feature: name,
                expected: self.n_rows,
                found: values.len(),
            });
        }
        self.columns.push((name, values));
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Look a column up by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Keep only `fields`, in the order given. Unknown fields are an error.
    pub fn select(&self, fields: &[String]) -> Result<Self, DetectError> {
        let mut seen = HashSet::new();
        let mut table = Self::default();
        for field in fields {
            if !seen.insert(field.as_str()) {
                return Err(DetectError::DuplicateFeature {
                    feature: field.clone(),
                });
            }
            let values = self.column(field).ok_or_else(|| DetectError::MissingFeature {
                feature: field.clone(),
            })?;
            table.push_column(field.clone(), values.to_vec())?;
        }
        Ok(table)
    }

    /// Apply `f` to every value, keeping names and order.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), v.iter().map(|&x| f(x)).collect()))
                .collect(),
            n_rows: self.n_rows,
        }
    }
}
