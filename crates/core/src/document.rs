//! User-facing row types.
//!
//! A [`Row`] is the caller-supplied record for one document: an external key
//! (the caller's primary key, unique across the corpus) plus typed columns.
//! Columns drive structured filtering, order-by expressions, and result
//! hydration; a configured subset of them is concatenated into the text that
//! gets indexed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A typed column value attached to a row.
///
/// Used by filter predicates (`eq`, `gt`, `in`, …) and order-by expressions.
/// Uses the default externally-tagged serde representation for bincode
/// compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    /// Boolean value (`true` / `false`).
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating-point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

impl ColumnValue {
    /// Render the value as text for indexing purposes.
    fn render(&self) -> String {
        match self {
            ColumnValue::Boolean(b) => b.to_string(),
            ColumnValue::Integer(i) => i.to_string(),
            ColumnValue::Float(f) => f.to_string(),
            ColumnValue::String(s) => s.clone(),
        }
    }
}

/// A caller-supplied document record: external key plus typed columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Caller primary key. Uniqueness is enforced on ingest.
    pub key: String,
    /// Named, typed columns.
    pub columns: HashMap<String, ColumnValue>,
}

impl Row {
    /// Create a row from a key and column pairs.
    pub fn new(key: impl Into<String>, columns: HashMap<String, ColumnValue>) -> Self {
        Self {
            key: key.into(),
            columns,
        }
    }

    /// Convenience constructor for a single-text-column row.
    pub fn from_text(key: impl Into<String>, field: &str, text: impl Into<String>) -> Self {
        let mut columns = HashMap::new();
        columns.insert(field.to_string(), ColumnValue::String(text.into()));
        Self {
            key: key.into(),
            columns,
        }
    }

    /// Column lookup by name.
    pub fn get(&self, field: &str) -> Option<&ColumnValue> {
        self.columns.get(field)
    }

    /// Concatenate the named fields into the text handed to the tokenizer.
    /// Missing fields contribute nothing; field order is the caller's.
    pub fn indexed_text(&self, fields: &[String]) -> String {
        let mut parts = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(value) = self.columns.get(field) {
                parts.push(value.render());
            }
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_text_concatenates_in_field_order() {
        let mut columns = HashMap::new();
        columns.insert("title".to_string(), ColumnValue::String("Alive".into()));
        columns.insert("text".to_string(), ColumnValue::String("daft punk".into()));
        let row = Row::new("x", columns);
        assert_eq!(
            row.indexed_text(&["title".to_string(), "text".to_string()]),
            "Alive daft punk"
        );
    }

    #[test]
    fn test_indexed_text_skips_missing_fields() {
        let row = Row::from_text("a", "text", "the cat sat");
        assert_eq!(
            row.indexed_text(&["title".to_string(), "text".to_string()]),
            "the cat sat"
        );
    }

    #[test]
    fn test_non_string_columns_render() {
        let mut columns = HashMap::new();
        columns.insert("year".to_string(), ColumnValue::Integer(1977));
        let row = Row::new("b", columns);
        assert_eq!(row.indexed_text(&["year".to_string()]), "1977");
    }
}
