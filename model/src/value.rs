//! FILENAME: model/src/value.rs
//! PURPOSE: Defines the dynamic value type flowing through a report run.
//! CONTEXT: This file contains the `Value` enum and `ColumnType`. Values
//! travel from the data cursor through the expression resolver to the
//! renderer. It is designed to be lightweight as one instance exists per
//! visited cell of the result set.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Declared type of a data source column. Drives the quoting decision when
/// column values are substituted into script text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Number,
    Text,
    Date,
    Time,
    Timestamp,
}

impl ColumnType {
    /// True when substitution must quote values of this column type to keep
    /// the surrounding script text syntactically valid. The declared type
    /// decides, not the value's runtime shape.
    pub fn needs_quoting(self) -> bool {
        matches!(
            self,
            ColumnType::Text | ColumnType::Date | ColumnType::Time | ColumnType::Timestamp
        )
    }
}

/// A single dynamic value read from the cursor or produced by evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Lossy numeric coercion used by aggregation: null folds as zero,
    /// booleans as 0/1, text is parsed when it looks like a number.
    pub fn to_number_lossy(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Text(s) => s.trim().parse().unwrap_or(0.0),
            Value::Date(_) | Value::Time(_) | Value::Timestamp(_) => 0.0,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                // Format without unnecessary decimal places
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
