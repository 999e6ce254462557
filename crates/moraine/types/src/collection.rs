//! Keyed lookup tables shared read-only by steps
//!
//! A [`Collection`] is an immutable table of rows addressed by a single
//! or composite key — physical constants, sea-level curves, geomagnetic
//! intensity series. Steps locate collections by name through a
//! [`CollectionSet`] rather than holding direct references, so the same
//! step runs against whichever tables an experiment registers.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};
use crate::value::AttributeValue;

// ── Row keys ───────────────────────────────────────────────────────────

/// The key addressing one collection row.
///
/// Single keys hold one part; composite keys hold the key fields in the
/// template's declared order. Keys order by part, with a stable rank
/// across value kinds so mixed tables still sort deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowKey(Vec<AttributeValue>);

impl RowKey {
    pub fn single(value: impl Into<AttributeValue>) -> Self {
        Self(vec![value.into()])
    }

    pub fn composite(parts: Vec<AttributeValue>) -> Self {
        Self(parts)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::single(value.into())
    }

    pub fn float(value: f64) -> Self {
        Self::single(value)
    }

    pub fn int(value: i64) -> Self {
        Self::single(value)
    }

    pub fn parts(&self) -> &[AttributeValue] {
        &self.0
    }

    /// Numeric view of a single-part key.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0.as_slice() {
            [part] => part.as_f64(),
            _ => None,
        }
    }
}

fn value_rank(value: &AttributeValue) -> u8 {
    match value {
        AttributeValue::Bool(_) => 0,
        AttributeValue::Int(_) => 1,
        AttributeValue::Float(_) => 2,
        AttributeValue::Text(_) => 3,
    }
}

fn compare_values(a: &AttributeValue, b: &AttributeValue) -> Ordering {
    match (a, b) {
        (AttributeValue::Bool(x), AttributeValue::Bool(y)) => x.cmp(y),
        (AttributeValue::Int(x), AttributeValue::Int(y)) => x.cmp(y),
        (AttributeValue::Float(x), AttributeValue::Float(y)) => x.total_cmp(y),
        (AttributeValue::Text(x), AttributeValue::Text(y)) => x.cmp(y),
        _ => value_rank(a).cmp(&value_rank(b)),
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match compare_values(a, b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality delegates to the ordering so the two can never disagree.
impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RowKey {}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [part] => write!(f, "{part}"),
            parts => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ── Collections ────────────────────────────────────────────────────────

/// An immutable keyed table. Rows are sorted by key at construction so
/// lookups are binary searches and key iteration is ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    name: String,
    columns: Vec<String>,
    rows: Vec<(RowKey, Vec<AttributeValue>)>,
}

impl Collection {
    /// Build a collection from keyed rows.
    ///
    /// Every row must carry one value per declared column, and keys must
    /// be unique.
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        mut rows: Vec<(RowKey, Vec<AttributeValue>)>,
    ) -> PipelineResult<Self> {
        let name = name.into();
        for (_, values) in &rows {
            if values.len() != columns.len() {
                return Err(PipelineError::RowWidth {
                    table: name.clone(),
                    expected: columns.len(),
                    got: values.len(),
                });
            }
        }
        rows.sort_by(|(a, _), (b, _)| a.cmp(b));
        if rows.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            return Err(PipelineError::DuplicateKey { collection: name });
        }
        Ok(Self { name, columns, rows })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The full row stored under `key`.
    pub fn row(&self, key: &RowKey) -> Option<&[AttributeValue]> {
        self.rows
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|i| self.rows[i].1.as_slice())
    }

    /// One named field of the row stored under `key`.
    pub fn field(&self, key: &RowKey, column: &str) -> Option<&AttributeValue> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.row(key)?.get(index)
    }

    /// Shortcut for single-column tables: the value stored under `key`.
    pub fn value(&self, key: &RowKey) -> Option<&AttributeValue> {
        self.row(key)?.first()
    }

    /// Numeric shortcut for single-column tables.
    pub fn number(&self, key: &RowKey) -> Option<f64> {
        self.value(key)?.as_f64()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.iter().map(|(k, _)| k)
    }

    /// The table as an ordered numeric series: `(key, column value)`
    /// pairs for every row. `None` if the column is unknown or any key
    /// or cell is non-numeric.
    pub fn numeric_entries(&self, column: &str) -> Option<Vec<(f64, f64)>> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .map(|(key, values)| Some((key.as_f64()?, values.get(index)?.as_f64()?)))
            .collect()
    }

    /// Mean of one numeric column. `None` if the column is unknown,
    /// empty, or holds a non-numeric cell.
    pub fn column_mean(&self, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| c == column)?;
        if self.rows.is_empty() {
            return None;
        }
        let mut sum = 0.0;
        for (_, values) in &self.rows {
            sum += values.get(index)?.as_f64()?;
        }
        Some(sum / self.rows.len() as f64)
    }
}

// ── Collection sets ────────────────────────────────────────────────────

/// The named collections available to one run.
#[derive(Debug, Clone, Default)]
pub struct CollectionSet {
    collections: HashMap<String, Collection>,
}

impl CollectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection under its own name.
    pub fn insert(&mut self, collection: Collection) -> PipelineResult<()> {
        let name = collection.name().to_string();
        if self.collections.contains_key(&name) {
            return Err(PipelineError::DuplicateCollection(name));
        }
        self.collections.insert(name, collection);
        Ok(())
    }

    /// Look up a collection a step depends on. Absence is a
    /// configuration error, not a per-sample one.
    pub fn get(&self, name: &str) -> PipelineResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| PipelineError::CollectionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
