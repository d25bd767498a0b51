//! Runtime value types for column comparison.
//!
//! [`Value`] is a column value borrowed from a stored row. [`Literal`] is the
//! owned counterpart that predicates carry and rows store.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Primary key of a record.
pub type Id = i64;

/// Column value for comparison, borrowed from the source row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    /// Text value (borrowed).
    Text(&'a str),
    /// Numeric value.
    Number(Number),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time, without zone (stored as UTC).
    Time(NaiveDateTime),
    /// Boolean value.
    Bool(bool),
    /// Column missing or null.
    Null,
}

impl<'a> Value<'a> {
    /// Returns `true` if this is a `Null` value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extracts the text value, if present.
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Extracts an integer id, if this is an integral number.
    pub fn as_id(&self) -> Option<Id> {
        match self {
            Value::Number(Number::I64(n)) => Some(*n),
            _ => None,
        }
    }

    /// Extracts the boolean value, if present.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` if this is null or text containing only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Numeric value.
///
/// Integers and floats compare with each other by converting to `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    /// Signed 64-bit integer.
    I64(i64),
    /// 64-bit floating point.
    F64(f64),
}

impl Number {
    /// Converts the number to f64 for comparison.
    pub fn to_f64(self) -> f64 {
        match self {
            Number::I64(n) => n as f64,
            Number::F64(n) => n,
        }
    }

    /// Compares two numbers, handling mixed types.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::I64(a), Number::I64(b)) => Some(a.cmp(&b)),
            (Number::F64(a), Number::F64(b)) => a.partial_cmp(&b),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(*other)
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::I64(n)
    }
}

impl From<i32> for Number {
    fn from(n: i32) -> Self {
        Number::I64(n as i64)
    }
}

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        Number::F64(n)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I64(n) => write!(f, "{}", n),
            Number::F64(n) => write!(f, "{}", n),
        }
    }
}

/// Owned value stored in rows and carried by predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Number(Number),
    Date(NaiveDate),
    Time(NaiveDateTime),
    Bool(bool),
}

impl Literal {
    /// Borrows this literal as a [`Value`].
    pub fn as_value(&self) -> Value<'_> {
        match self {
            Literal::Text(s) => Value::Text(s),
            Literal::Number(n) => Value::Number(*n),
            Literal::Date(d) => Value::Date(*d),
            Literal::Time(t) => Value::Time(*t),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Text(s)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Number(Number::I64(n))
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Number(Number::I64(n as i64))
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(Number::F64(n))
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<NaiveDate> for Literal {
    fn from(d: NaiveDate) -> Self {
        Literal::Date(d)
    }
}

impl From<NaiveDateTime> for Literal {
    fn from(t: NaiveDateTime) -> Self {
        Literal::Time(t)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Date(d) => write!(f, "'{}'", d.format("%Y-%m-%d")),
            Literal::Time(t) => write!(f, "'{}'", t.format("%Y-%m-%d %H:%M:%S")),
            Literal::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

/// Compares two values of the same type.
///
/// Text compares case-insensitively. Returns `None` when either side is
/// null or the types don't match; callers treat that as "no match".
pub fn compare_values(a: &Value<'_>, b: &Value<'_>) -> Option<Ordering> {
    match (a, b) {
        (Value::Text(a), Value::Text(b)) => Some(cmp_ignore_case(a, b)),
        (Value::Number(a), Value::Number(b)) => a.compare(*b),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Time(b)) => Some(a.and_time(chrono::NaiveTime::MIN).cmp(b)),
        (Value::Time(a), Value::Date(b)) => Some(a.cmp(&b.and_time(chrono::NaiveTime::MIN))),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    let a = a.chars().flat_map(char::to_lowercase);
    let b = b.chars().flat_map(char::to_lowercase);
    a.cmp(b)
}
