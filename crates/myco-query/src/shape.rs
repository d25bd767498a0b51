//! Value shapes accepted by filters, and normalization into canonical form.
//!
//! Normalization runs before compilation and before fingerprinting, so two
//! spellings of the same request (`"yes"` and `true`, `5` and `[5]`) compile
//! and cache identically.

use crate::error::{QueryError, Result};
use crate::param::{ParamMap, ParamValue};
use crate::schema::RecordType;

/// Kind of a single scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int,
    Float,
    Text,
    /// Date at year, month, day or month-day granularity, as text.
    Date,
    /// Timestamp at any granularity down to seconds, as text.
    Time,
    /// A record named by id or by a lookup string.
    Record,
}

/// Accepted value shape of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Boolean,
    Scalar(Scalar),
    /// One value or a list of values.
    List(Scalar),
    /// `[low, high]`, or one value meaning `[v, v]`.
    Range(Scalar),
    Choice(&'static [&'static str]),
    ChoiceList(&'static [&'static str]),
    ChoiceRange(&'static [&'static str]),
    /// `{north, south, east, west}` in degrees.
    Box,
    /// Name lookup with closure flags.
    NameLookup,
    /// `{type, id}` naming one record of any type.
    Target,
}

/// Flags accepted next to `lookup` in a name lookup.
pub const NAME_LOOKUP_FLAGS: &[&str] = &[
    "exclude_consensus",
    "exclude_original_names",
    "include_all_name_proposals",
    "include_immediate_subtaxa",
    "include_subtaxa",
    "include_synonyms",
];

impl Shape {
    /// Human description used in [`QueryError::InvalidShape`].
    pub fn expected(self) -> &'static str {
        match self {
            Shape::Boolean => "a boolean",
            Shape::Scalar(Scalar::Record) | Shape::List(Scalar::Record) => "record ids or names",
            Shape::Scalar(Scalar::Date) => "a date",
            Shape::Scalar(Scalar::Time) => "a time",
            Shape::Scalar(_) => "a single value",
            Shape::List(Scalar::Int) => "a list of ids",
            Shape::List(_) => "a list of values",
            Shape::Range(Scalar::Date) => "a date or a pair of dates",
            Shape::Range(Scalar::Time) => "a time or a pair of times",
            Shape::Range(_) => "a number or a pair of numbers",
            Shape::Choice(_) => "one of the listed choices",
            Shape::ChoiceList(_) => "listed choices",
            Shape::ChoiceRange(_) => "a choice or a pair of choices",
            Shape::Box => "a box with north, south, east and west",
            Shape::NameLookup => "a name lookup",
            Shape::Target => "a map with type and id",
        }
    }

    /// Coerces `value` into this shape's canonical form. Lists longer than
    /// `max_list` are rejected.
    pub fn normalize(self, filter: &str, value: &ParamValue, max_list: usize) -> Result<ParamValue> {
        let fail = || QueryError::shape(filter, self.expected(), value);

        match self {
            Shape::Boolean => coerce_bool(value).map(ParamValue::Bool).ok_or_else(fail),
            Shape::Scalar(kind) => coerce_scalar(kind, value).ok_or_else(fail),
            Shape::List(kind) => {
                let items = as_items(value)
                    .iter()
                    .map(|item| coerce_scalar(kind, item).ok_or_else(fail))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ParamValue::List(cap(filter, items, max_list)?))
            }
            Shape::Range(kind) => {
                let (low, high) = as_pair(value).ok_or_else(fail)?;
                let low = coerce_scalar(kind, low).ok_or_else(fail)?;
                let high = coerce_scalar(kind, high).ok_or_else(fail)?;
                Ok(ParamValue::List(vec![low, high]))
            }
            Shape::Choice(choices) => coerce_choice(choices, value).ok_or_else(fail),
            Shape::ChoiceList(choices) => {
                let items = as_items(value)
                    .iter()
                    .map(|item| coerce_choice(choices, item).ok_or_else(fail))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ParamValue::List(items))
            }
            Shape::ChoiceRange(choices) => {
                let (low, high) = as_pair(value).ok_or_else(fail)?;
                let low = coerce_choice(choices, low).ok_or_else(fail)?;
                let high = coerce_choice(choices, high).ok_or_else(fail)?;
                Ok(ParamValue::List(vec![low, high]))
            }
            Shape::Box => normalize_box(filter, value),
            Shape::NameLookup => normalize_name_lookup(filter, value, max_list),
            Shape::Target => normalize_target(filter, value),
        }
    }
}

/// Accepts booleans, `0`/`1`, and the usual yes/no spellings.
pub fn coerce_bool(value: &ParamValue) -> Option<bool> {
    match value {
        ParamValue::Bool(b) => Some(*b),
        ParamValue::Int(0) => Some(false),
        ParamValue::Int(1) => Some(true),
        ParamValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_scalar(kind: Scalar, value: &ParamValue) -> Option<ParamValue> {
    match (kind, value) {
        (Scalar::Bool, v) => coerce_bool(v).map(ParamValue::Bool),
        (Scalar::Int, ParamValue::Int(i)) => Some(ParamValue::Int(*i)),
        (Scalar::Int, ParamValue::Text(s)) => s.trim().parse().ok().map(ParamValue::Int),
        (Scalar::Float, ParamValue::Int(i)) => Some(ParamValue::Float(*i as f64)),
        (Scalar::Float, ParamValue::Float(f)) if f.is_finite() => Some(ParamValue::Float(*f)),
        (Scalar::Float, ParamValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(ParamValue::Float),
        (Scalar::Text, ParamValue::Text(s)) => Some(ParamValue::Text(s.trim().to_string())),
        (Scalar::Date | Scalar::Time, ParamValue::Text(s)) => {
            Some(ParamValue::Text(s.trim().to_string()))
        }
        // A bare year.
        (Scalar::Date | Scalar::Time, ParamValue::Int(i)) => Some(ParamValue::Text(i.to_string())),
        (Scalar::Record, ParamValue::Int(i)) => Some(ParamValue::Int(*i)),
        (Scalar::Record, ParamValue::Text(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(id) => Some(ParamValue::Int(id)),
                Err(_) => Some(ParamValue::Text(s.to_string())),
            }
        }
        _ => None,
    }
}

fn coerce_choice(choices: &[&str], value: &ParamValue) -> Option<ParamValue> {
    let text = match value {
        ParamValue::Text(s) => s.trim().to_ascii_lowercase(),
        ParamValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    choices
        .iter()
        .find(|choice| choice.eq_ignore_ascii_case(&text))
        .map(|choice| ParamValue::Text(choice.to_string()))
}

/// A scalar is a one-item list.
fn as_items(value: &ParamValue) -> Vec<ParamValue> {
    match value {
        ParamValue::List(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// A scalar is a degenerate pair.
fn as_pair(value: &ParamValue) -> Option<(&ParamValue, &ParamValue)> {
    match value {
        ParamValue::List(items) => match items.as_slice() {
            [only] => Some((only, only)),
            [low, high] => Some((low, high)),
            _ => None,
        },
        ParamValue::Nested(_) => None,
        scalar => Some((scalar, scalar)),
    }
}

fn cap(filter: &str, items: Vec<ParamValue>, max_list: usize) -> Result<Vec<ParamValue>> {
    if items.len() > max_list {
        return Err(QueryError::shape(
            filter,
            "no more items than max_id_set",
            format!("{} items", items.len()),
        ));
    }
    Ok(items)
}

fn normalize_box(filter: &str, value: &ParamValue) -> Result<ParamValue> {
    let expected = Shape::Box.expected();
    let map = value
        .as_map()
        .ok_or_else(|| QueryError::shape(filter, expected, value))?;

    let mut out = ParamMap::new();
    for (side, limit) in [("north", 90.0), ("south", 90.0), ("east", 180.0), ("west", 180.0)] {
        let coord = map
            .get(side)
            .and_then(|v| coerce_scalar(Scalar::Float, v))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| QueryError::shape(filter, expected, value))?;
        if !(-limit..=limit).contains(&coord) {
            return Err(QueryError::shape(filter, "coordinates within range", value));
        }
        out.insert(side.to_string(), ParamValue::Float(coord));
    }
    if let Some(extra) = map.keys().find(|k| !out.contains_key(k.as_str())) {
        return Err(QueryError::shape(filter, expected, format!("unexpected key '{extra}'")));
    }

    let north = out["north"].as_f64().unwrap_or_default();
    let south = out["south"].as_f64().unwrap_or_default();
    if south > north {
        return Err(QueryError::shape(filter, "south not above north", value));
    }
    Ok(ParamValue::Nested(out))
}

fn normalize_name_lookup(filter: &str, value: &ParamValue, max_list: usize) -> Result<ParamValue> {
    let record_list = Shape::List(Scalar::Record);
    let mut out = ParamMap::new();

    match value {
        ParamValue::Nested(map) => {
            let lookup = map
                .get("lookup")
                .ok_or_else(|| QueryError::shape(filter, "a map with lookup", value))?;
            out.insert("lookup".into(), record_list.normalize(filter, lookup, max_list)?);
            for (key, flag) in map {
                if key == "lookup" {
                    continue;
                }
                if !NAME_LOOKUP_FLAGS.contains(&key.as_str()) {
                    return Err(QueryError::shape(filter, "a known lookup flag", key));
                }
                let on = coerce_bool(flag)
                    .ok_or_else(|| QueryError::shape(filter, "a boolean flag", flag))?;
                if on {
                    out.insert(key.clone(), ParamValue::Bool(true));
                }
            }
            // An explicit `include_all_name_proposals: false` only matters next
            // to `exclude_consensus`, where it empties the result.
            let refused = map
                .get("include_all_name_proposals")
                .and_then(coerce_bool)
                == Some(false);
            if refused && out.contains_key("exclude_consensus") {
                out.insert("include_all_name_proposals".into(), ParamValue::Bool(false));
            }
        }
        other => {
            out.insert("lookup".into(), record_list.normalize(filter, other, max_list)?);
        }
    }
    Ok(ParamValue::Nested(out))
}

fn normalize_target(filter: &str, value: &ParamValue) -> Result<ParamValue> {
    let expected = Shape::Target.expected();
    let map = value
        .as_map()
        .ok_or_else(|| QueryError::shape(filter, expected, value))?;
    let record_type = map
        .get("type")
        .and_then(ParamValue::as_str)
        .ok_or_else(|| QueryError::shape(filter, expected, value))
        .and_then(RecordType::parse)?;
    let id = map
        .get("id")
        .and_then(|v| coerce_scalar(Scalar::Int, v))
        .ok_or_else(|| QueryError::shape(filter, expected, value))?;

    let mut out = ParamMap::new();
    out.insert("type".into(), ParamValue::Text(record_type.model_name().into()));
    out.insert("id".into(), id);
    Ok(ParamValue::Nested(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn norm(shape: Shape, value: impl Into<ParamValue>) -> Result<ParamValue> {
        shape.normalize("f", &value.into(), 1000)
    }

    #[test]
    fn booleans() {
        for yes in [ParamValue::from(true), "yes".into(), "ON".into(), 1.into(), "1".into()] {
            assert_eq!(norm(Shape::Boolean, yes).unwrap(), ParamValue::Bool(true));
        }
        for no in [ParamValue::from(false), "no".into(), "off".into(), 0.into()] {
            assert_eq!(norm(Shape::Boolean, no).unwrap(), ParamValue::Bool(false));
        }
        assert!(norm(Shape::Boolean, "maybe").is_err());
        assert!(norm(Shape::Boolean, 2).is_err());
    }

    #[test]
    fn scalar_becomes_list() {
        let v = norm(Shape::List(Scalar::Int), 5).unwrap();
        assert_eq!(v, ParamValue::from(vec![5]));
        let v = norm(Shape::List(Scalar::Int), vec!["5", "6"]).unwrap();
        assert_eq!(v, ParamValue::from(vec![5, 6]));
        assert!(norm(Shape::List(Scalar::Int), vec!["five"]).is_err());
    }

    #[test]
    fn empty_list_is_kept() {
        let v = norm(Shape::List(Scalar::Int), Vec::<i64>::new()).unwrap();
        assert_eq!(v, ParamValue::List(vec![]));
    }

    #[test]
    fn lists_over_the_cap_are_rejected() {
        let shape = Shape::List(Scalar::Int);
        let at_cap = shape.normalize("id_in_set", &ParamValue::from(vec![1, 2]), 2).unwrap();
        assert_eq!(at_cap, ParamValue::from(vec![1, 2]));

        let err = shape
            .normalize("id_in_set", &ParamValue::from(vec![1, 2, 3, 4]), 2)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidShape { ref filter, .. } if filter == "id_in_set"));
        assert!(err.is_client_error());
    }

    #[test]
    fn records_keep_ids_and_names() {
        let v = norm(Shape::List(Scalar::Record), vec!["12", "Mary Smith <msmith>"]).unwrap();
        assert_eq!(
            v,
            ParamValue::List(vec![ParamValue::Int(12), ParamValue::from("Mary Smith <msmith>")])
        );
    }

    #[test]
    fn ranges() {
        assert_eq!(
            norm(Shape::Range(Scalar::Date), "2005").unwrap(),
            ParamValue::from(vec!["2005", "2005"])
        );
        assert_eq!(
            norm(Shape::Range(Scalar::Date), 2005).unwrap(),
            ParamValue::from(vec!["2005", "2005"])
        );
        assert_eq!(
            norm(Shape::Range(Scalar::Float), vec![3, 1]).unwrap(),
            ParamValue::from(vec![3.0, 1.0])
        );
        assert!(norm(Shape::Range(Scalar::Float), vec![1, 2, 3]).is_err());
    }

    #[test]
    fn choices_are_canonical() {
        const SIZES: &[&str] = &["small", "medium"];
        assert_eq!(norm(Shape::Choice(SIZES), "Medium").unwrap(), ParamValue::from("medium"));
        assert!(norm(Shape::Choice(SIZES), "huge").is_err());
        assert_eq!(
            norm(Shape::ChoiceList(SIZES), "small").unwrap(),
            ParamValue::from(vec!["small"])
        );
    }

    #[test]
    fn boxes() {
        let ok = params! { "north" => 90, "south" => 0, "east" => -170, "west" => "170" };
        let v = norm(Shape::Box, ok).unwrap();
        assert_eq!(v.as_map().unwrap()["west"], ParamValue::Float(170.0));

        let inverted = params! { "north" => 0, "south" => 10, "east" => 1, "west" => 0 };
        assert!(norm(Shape::Box, inverted).is_err());

        let out_of_range = params! { "north" => 91, "south" => 0, "east" => 1, "west" => 0 };
        assert!(norm(Shape::Box, out_of_range).is_err());

        let missing = params! { "north" => 1, "south" => 0, "east" => 1 };
        assert!(norm(Shape::Box, missing).is_err());

        let not_numeric = params! { "north" => "up", "south" => 0, "east" => 1, "west" => 0 };
        assert!(norm(Shape::Box, not_numeric).is_err());
    }

    #[test]
    fn name_lookup_drops_false_flags() {
        let v = norm(
            Shape::NameLookup,
            params! { "lookup" => "Agaricus", "include_subtaxa" => "yes", "include_synonyms" => false },
        )
        .unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(map["lookup"], ParamValue::from(vec!["Agaricus"]));
        assert_eq!(map["include_subtaxa"], ParamValue::Bool(true));
        assert!(!map.contains_key("include_synonyms"));
    }

    #[test]
    fn bare_name_lookup() {
        let v = norm(Shape::NameLookup, vec![1, 2]).unwrap();
        assert_eq!(v.as_map().unwrap()["lookup"], ParamValue::from(vec![1, 2]));
    }

    #[test]
    fn name_lookup_keeps_refused_proposals_beside_exclude_consensus() {
        let refused = norm(
            Shape::NameLookup,
            params! { "lookup" => 4, "exclude_consensus" => true, "include_all_name_proposals" => "no" },
        )
        .unwrap();
        assert_eq!(
            refused.as_map().unwrap().get("include_all_name_proposals"),
            Some(&ParamValue::Bool(false))
        );

        let alone = norm(
            Shape::NameLookup,
            params! { "lookup" => 4, "include_all_name_proposals" => false },
        )
        .unwrap();
        assert_eq!(alone, norm(Shape::NameLookup, 4).unwrap());
    }

    #[test]
    fn name_lookup_rejects_unknown_flag() {
        assert!(norm(Shape::NameLookup, params! { "lookup" => 1, "include_cousins" => true }).is_err());
    }

    #[test]
    fn targets() {
        let v = norm(Shape::Target, params! { "type" => "observation", "id" => "7" }).unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(map["type"], ParamValue::from("Observation"));
        assert_eq!(map["id"], ParamValue::Int(7));
        assert!(norm(Shape::Target, params! { "type" => "fungus", "id" => 1 }).is_err());
    }
}
