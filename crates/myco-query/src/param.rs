//! Query parameters: the untyped, nested map callers hand to the engine.
//!
//! [`ParamValue::from_json`] is the validating boundary. Nulls inside lists
//! are rejected and null map entries are dropped, so nothing past this point
//! ever sees a null.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QueryError, Result};

/// Sorted parameter map. Sorting makes iteration (and so compilation and
/// fingerprinting) independent of the order the caller built it in.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
    Nested(ParamMap),
}

impl ParamValue {
    /// Converts a JSON value, rejecting nulls.
    pub fn from_json(value: &serde_json::Value) -> Result<ParamValue> {
        use serde_json::Value as Json;

        Ok(match value {
            Json::Null => return Err(QueryError::shape("params", "a value", "null")),
            Json::Bool(b) => ParamValue::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => ParamValue::Text(s.clone()),
            Json::Array(items) => ParamValue::List(
                items
                    .iter()
                    .map(|item| match item {
                        Json::Null => Err(QueryError::shape("params", "a list without nulls", value)),
                        other => ParamValue::from_json(other),
                    })
                    .collect::<Result<_>>()?,
            ),
            Json::Object(_) => ParamValue::Nested(params_from_json(value)?),
        })
    }

    /// Converts back to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            ParamValue::Bool(b) => Json::Bool(*b),
            ParamValue::Int(i) => Json::from(*i),
            ParamValue::Float(f) => Json::from(*f),
            ParamValue::Text(s) => Json::String(s.clone()),
            ParamValue::List(items) => Json::Array(items.iter().map(ParamValue::to_json).collect()),
            ParamValue::Nested(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, accepting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ParamMap> {
        match self {
            ParamValue::Nested(map) => Some(map),
            _ => None,
        }
    }

    /// Returns `true` for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        matches!(self, ParamValue::Text(s) if s.trim().is_empty())
    }

    /// Short description of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "boolean",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "number",
            ParamValue::Text(_) => "string",
            ParamValue::List(_) => "list",
            ParamValue::Nested(_) => "map",
        }
    }
}

/// Converts a JSON object into a parameter map, dropping null entries.
pub fn params_from_json(value: &serde_json::Value) -> Result<ParamMap> {
    let object = value
        .as_object()
        .ok_or_else(|| QueryError::shape("params", "a map", value))?;
    let mut map = ParamMap::new();
    for (key, item) in object {
        if item.is_null() {
            continue;
        }
        map.insert(key.clone(), ParamValue::from_json(item)?);
    }
    Ok(map)
}

/// Renders a parameter map as compact JSON with sorted keys.
pub fn params_to_json(map: &ParamMap) -> serde_json::Value {
    serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        ParamValue::from_json(&json).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<ParamMap> for ParamValue {
    fn from(map: ParamMap) -> Self {
        ParamValue::Nested(map)
    }
}

/// Builds a [`ParamMap`] from `key => value` pairs.
///
/// ```rust
/// use myco_query::{params, ParamValue};
///
/// let p = params! {
///     "has_notes" => true,
///     "location_query" => params! { "region" => "California, USA" },
/// };
/// assert_eq!(p["has_notes"], ParamValue::Bool(true));
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::ParamMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::ParamMap::new();
        $( map.insert(::std::string::String::from($key), $crate::ParamValue::from($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_drops_null_entries() {
        let map = params_from_json(&json!({"a": 1, "b": null, "c": {"d": null, "e": "x"}})).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], ParamValue::Int(1));
        let nested = map["c"].as_map().unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested["e"], ParamValue::Text("x".into()));
    }

    #[test]
    fn from_json_rejects_null_in_list() {
        let err = params_from_json(&json!({"id_in_set": [1, null]})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidShape { .. }));
    }

    #[test]
    fn from_json_rejects_non_object() {
        assert!(params_from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn numbers_keep_their_kind() {
        assert_eq!(ParamValue::from_json(&json!(3)).unwrap(), ParamValue::Int(3));
        assert_eq!(ParamValue::from_json(&json!(3.5)).unwrap(), ParamValue::Float(3.5));
    }

    #[test]
    fn deserialize_through_serde() {
        let map: ParamMap = serde_json::from_str(r#"{"names": {"lookup": ["Agaricus"]}}"#).unwrap();
        let names = map["names"].as_map().unwrap();
        assert_eq!(names["lookup"], ParamValue::from(vec!["Agaricus"]));
    }

    #[test]
    fn display_is_sorted_json() {
        let p = params! { "b" => 1, "a" => vec![true, false] };
        assert_eq!(ParamValue::Nested(p).to_string(), r#"{"a":[true,false],"b":1}"#);
    }

    #[test]
    fn blank_text() {
        assert!(ParamValue::from("  ").is_blank());
        assert!(!ParamValue::from("x").is_blank());
        assert!(!ParamValue::from(0).is_blank());
    }
}
