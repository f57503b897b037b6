//! Structured filter and ordering types for search requests.
//!
//! Defines the predicate structure evaluated against row columns during
//! query execution, and the optional order-by expression that replaces the
//! default score ordering.

use serde::Deserialize;

/// Filter clause with `must` (AND) and `must_not` (AND-NOT) conditions.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterClause {
    #[serde(default)]
    pub must: Vec<FilterCondition>,
    #[serde(default)]
    pub must_not: Vec<FilterCondition>,
}

/// A single condition on a row column.
#[derive(Debug, Deserialize, Clone)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOperator,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub values: Option<Vec<serde_json::Value>>,
}

/// Comparison operator for filter conditions.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
}

/// Order-by expression over a row column. When present, candidates are
/// ranked by the named column instead of relevance score; score (then
/// ascending document id) breaks ties. Rows missing the column sort last.
#[derive(Debug, Deserialize, Clone)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

impl FilterClause {
    /// Build an AND-only clause.
    pub fn must(conditions: Vec<FilterCondition>) -> Self {
        Self {
            must: conditions,
            must_not: Vec::new(),
        }
    }
}

impl FilterCondition {
    /// Single-value condition (`eq`, `ne`, `gt`, `lt`, `gte`, `lte`).
    pub fn new(field: impl Into<String>, op: FilterOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            op,
            value: Some(value),
            values: None,
        }
    }

    /// Set-membership condition (`in`).
    pub fn within(field: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOperator::In,
            value: None,
            values: Some(values),
        }
    }
}
