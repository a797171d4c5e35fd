//! Row filters.
//!
//! A [`Predicate`] is evaluated locally against rows (by the in-memory
//! store and change feed) and rendered as a `where` clause for an upstream
//! change-feed service. Rendering quotes identifiers with double quotes and
//! text literals with single quotes, doubling embedded quotes.

use rowsync_sync_protocol::Row;
use serde_json::Value;
use std::fmt::Write as _;

/// A filter over rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// Column equals a value. Null and missing columns never match.
    Eq {
        /// Column name.
        column: String,
        /// Value to compare against.
        value: Value,
    },
    /// Column equals one of the values.
    In {
        /// Column name.
        column: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// Column is null or missing.
    IsNull {
        /// Column name.
        column: String,
    },
    /// All inner predicates match.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Creates an equality predicate. Comparing against null yields `IsNull`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        match value.into() {
            Value::Null => Predicate::IsNull { column },
            value => Predicate::Eq { column, value },
        }
    }

    /// Creates a membership predicate.
    pub fn is_in(column: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().collect(),
        }
    }

    /// Creates a null check.
    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull {
            column: column.into(),
        }
    }

    /// Conjunction of two predicates, flattening nested conjunctions and
    /// dropping `True` operands.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = Vec::new();
        for p in [self, other] {
            match p {
                Predicate::True => {}
                Predicate::And(inner) => parts.extend(inner),
                p => parts.push(p),
            }
        }
        match parts.len() {
            0 => Predicate::True,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// Returns true if the predicate matches every row.
    pub fn is_trivial(&self) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(parts) => parts.iter().all(Predicate::is_trivial),
            _ => false,
        }
    }

    /// Evaluates the predicate against a row.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::True => true,
            Predicate::Eq { column, value } => row
                .get(column)
                .is_some_and(|actual| values_equal(actual, value)),
            Predicate::In { column, values } => row
                .get(column)
                .is_some_and(|actual| values.iter().any(|v| values_equal(actual, v))),
            Predicate::IsNull { column } => row.get(column).map_or(true, Value::is_null),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(row)),
        }
    }

    /// Renders the predicate as a `where` clause.
    pub fn to_where_clause(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            Predicate::True => out.push_str("true"),
            Predicate::Eq { column, value } => {
                push_identifier(out, column);
                out.push_str(" = ");
                push_literal(out, value);
            }
            Predicate::In { values, .. } if values.is_empty() => out.push_str("false"),
            Predicate::In { column, values } => {
                push_identifier(out, column);
                out.push_str(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    push_literal(out, value);
                }
                out.push(')');
            }
            Predicate::IsNull { column } => {
                push_identifier(out, column);
                out.push_str(" IS NULL");
            }
            Predicate::And(parts) => match parts.as_slice() {
                [] => out.push_str("true"),
                [only] => only.render(out),
                parts => {
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            out.push_str(" AND ");
                        }
                        out.push('(');
                        part.render(out);
                        out.push(')');
                    }
                }
            },
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::True
    }
}

// Numbers compare by value so that 7 and 7.0 are equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

fn push_identifier(out: &mut String, name: &str) {
    out.push('"');
    out.push_str(&name.replace('"', "\"\""));
    out.push('"');
}

fn push_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => push_text(out, s),
        other => push_text(out, &other.to_string()),
    }
}

fn push_text(out: &mut String, text: &str) {
    out.push('\'');
    out.push_str(&text.replace('\'', "''"));
    out.push('\'');
}
