//! Templates: field typing and key policy for tabular data

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collection::{Collection, RowKey};
use crate::errors::{PipelineError, PipelineResult};
use crate::value::AttributeValue;

/// The declared type of one template field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Float,
    Integer,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Float => write!(f, "float"),
            FieldType::Integer => write!(f, "integer"),
        }
    }
}

/// One field of a template: its name, type, and whether it belongs to
/// the row key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub name: String,
    pub kind: FieldType,
    pub is_key: bool,
}

/// The schema converting raw text rows into a [`Collection`].
///
/// Key fields combine, in declared order, into the row key; the
/// remaining fields become the collection's value columns. A template
/// must declare at least one key field and at least two fields total —
/// a table that is all key carries no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    name: String,
    fields: Vec<TemplateField>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder: append a key field.
    pub fn with_key_field(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.fields.push(TemplateField {
            name: name.into(),
            kind,
            is_key: true,
        });
        self
    }

    /// Builder: append a value field.
    pub fn with_value_field(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.fields.push(TemplateField {
            name: name.into(),
            kind,
            is_key: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    /// Check the schema itself, independent of any data.
    pub fn validate(&self) -> PipelineResult<()> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(PipelineError::DuplicateField {
                    template: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        if !self.fields.iter().any(|f| f.is_key) {
            return Err(PipelineError::TemplateWithoutKeys(self.name.clone()));
        }
        if self.fields.len() < 2 {
            return Err(PipelineError::TemplateTooSmall(self.name.clone()));
        }
        Ok(())
    }

    /// Convert raw text rows into a keyed collection named after this
    /// template. Cells are trimmed before parsing; any cell that fails
    /// its declared type rejects the whole table.
    pub fn build_collection(&self, rows: &[Vec<String>]) -> PipelineResult<Collection> {
        self.validate()?;

        let columns: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !f.is_key)
            .map(|f| f.name.clone())
            .collect();

        let mut keyed_rows = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != self.fields.len() {
                return Err(PipelineError::RowWidth {
                    table: self.name.clone(),
                    expected: self.fields.len(),
                    got: row.len(),
                });
            }

            let mut key_parts = Vec::new();
            let mut values = Vec::new();
            for (field, cell) in self.fields.iter().zip(row) {
                let parsed = self.parse_cell(field, cell)?;
                if field.is_key {
                    key_parts.push(parsed);
                } else {
                    values.push(parsed);
                }
            }

            let key = match key_parts.len() {
                1 => RowKey::single(key_parts.remove(0)),
                _ => RowKey::composite(key_parts),
            };
            keyed_rows.push((key, values));
        }

        Collection::from_rows(self.name.clone(), columns, keyed_rows)
    }

    fn parse_cell(&self, field: &TemplateField, cell: &str) -> PipelineResult<AttributeValue> {
        let trimmed = cell.trim();
        let parse_error = || PipelineError::CellParse {
            template: self.name.clone(),
            field: field.name.clone(),
            cell: cell.to_string(),
            kind: field.kind,
        };
        match field.kind {
            FieldType::Text => Ok(AttributeValue::Text(trimmed.to_string())),
            FieldType::Float => trimmed
                .parse::<f64>()
                .map(AttributeValue::Float)
                .map_err(|_| parse_error()),
            FieldType::Integer => trimmed
                .parse::<i64>()
                .map(AttributeValue::Int)
                .map_err(|_| parse_error()),
        }
    }
}
