//! Row-predicate evaluation for search queries.
//!
//! Evaluates [`FilterClause`] predicates against row columns. Supports
//! `must` (AND) and `must_not` (AND-NOT) conditions with operators:
//! `eq`, `ne`, `gt`, `lt`, `gte`, `lte`, `in`.

use crate::document::{ColumnValue, Row};
use crate::filter_types::{FilterClause, FilterCondition, FilterOperator};

/// Check whether a row matches the clause. `must` conditions are AND-ed;
/// `must_not` conditions are AND-NOT-ed.
pub fn matches_filter(row: &Row, filter: &FilterClause) -> bool {
    for cond in &filter.must {
        if !evaluate_condition(row, cond) {
            return false;
        }
    }
    for cond in &filter.must_not {
        if evaluate_condition(row, cond) {
            return false;
        }
    }
    true
}

fn evaluate_condition(row: &Row, cond: &FilterCondition) -> bool {
    let Some(column) = row.get(&cond.field) else {
        return false;
    };

    match cond.op {
        FilterOperator::Eq => cond.value.as_ref().is_some_and(|v| column_eq(column, v)),
        FilterOperator::Ne => cond.value.as_ref().is_some_and(|v| !column_eq(column, v)),
        FilterOperator::Gt => cond.value.as_ref().is_some_and(|v| {
            column_cmp(column, v).is_some_and(|o| o == std::cmp::Ordering::Greater)
        }),
        FilterOperator::Lt => cond
            .value
            .as_ref()
            .is_some_and(|v| column_cmp(column, v).is_some_and(|o| o == std::cmp::Ordering::Less)),
        FilterOperator::Gte => cond
            .value
            .as_ref()
            .is_some_and(|v| column_cmp(column, v).is_some_and(|o| o != std::cmp::Ordering::Less)),
        FilterOperator::Lte => cond.value.as_ref().is_some_and(|v| {
            column_cmp(column, v).is_some_and(|o| o != std::cmp::Ordering::Greater)
        }),
        FilterOperator::In => cond
            .values
            .as_ref()
            .is_some_and(|vals| vals.iter().any(|v| column_eq(column, v))),
    }
}

/// Compare a column with a JSON literal for equality.
fn column_eq(column: &ColumnValue, json: &serde_json::Value) -> bool {
    match (column, json) {
        (ColumnValue::String(s), serde_json::Value::String(js)) => s == js,
        (ColumnValue::Boolean(b), serde_json::Value::Bool(jb)) => b == jb,
        (ColumnValue::Integer(i), serde_json::Value::Number(n)) => {
            n.as_i64().is_some_and(|ni| *i == ni)
                || n.as_f64()
                    .is_some_and(|nf| (*i as f64 - nf).abs() < f64::EPSILON)
        }
        (ColumnValue::Float(f), serde_json::Value::Number(n)) => {
            n.as_f64().is_some_and(|nf| (*f - nf).abs() < f64::EPSILON)
        }
        _ => false,
    }
}

/// Compare a column with a JSON literal for ordering (numeric only).
fn column_cmp(column: &ColumnValue, json: &serde_json::Value) -> Option<std::cmp::Ordering> {
    let column_f = match column {
        ColumnValue::Integer(i) => *i as f64,
        ColumnValue::Float(f) => *f,
        _ => return None,
    };
    let json_f = json.as_f64()?;
    column_f.partial_cmp(&json_f)
}

/// Ordering between two optional column values for order-by ranking.
/// Missing columns sort after present ones regardless of direction.
pub fn column_ordering(a: Option<&ColumnValue>, b: Option<&ColumnValue>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x, y) {
            (ColumnValue::Integer(a), ColumnValue::Integer(b)) => a.cmp(b),
            (ColumnValue::Float(a), ColumnValue::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (ColumnValue::Integer(a), ColumnValue::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (ColumnValue::Float(a), ColumnValue::Integer(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (ColumnValue::String(a), ColumnValue::String(b)) => a.cmp(b),
            (ColumnValue::Boolean(a), ColumnValue::Boolean(b)) => a.cmp(b),
            // Mixed incomparable types keep their relative order.
            _ => Ordering::Equal,
        },
    }
}
