//! Builders shared by many record types: identity, attribution, presence,
//! per-field search and links to other records.

use myco_pattern::{tokenize, BooleanExpr, Lower};

use super::{field_column, FilterCx, FilterName};
use crate::error::{QueryError, Result};
use crate::lookup::resolve_ids;
use crate::op::Op;
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::{self, ColumnKind, Link, RecordType};
use crate::value::{Id, Literal};

// ============================================================================
// Value access
// ============================================================================

pub(super) fn bool_value(name: FilterName, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| QueryError::shape(name.as_str(), "a boolean", value))
}

pub(super) fn list_value(name: FilterName, value: &ParamValue) -> Result<&[ParamValue]> {
    value
        .as_list()
        .ok_or_else(|| QueryError::shape(name.as_str(), "a list", value))
}

pub(super) fn text_value(name: FilterName, value: &ParamValue) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| QueryError::shape(name.as_str(), "a string", value))
}

/// Sorted `[low, high]` numeric bounds.
pub(super) fn float_range(name: FilterName, value: &ParamValue) -> Result<(f64, f64)> {
    let bounds = list_value(name, value)?;
    match bounds {
        [low, high] => {
            let (Some(low), Some(high)) = (low.as_f64(), high.as_f64()) else {
                return Err(QueryError::shape(name.as_str(), "a pair of numbers", value));
            };
            Ok(if low <= high { (low, high) } else { (high, low) })
        }
        _ => Err(QueryError::shape(name.as_str(), "a pair of numbers", value)),
    }
}

pub(super) fn literal(value: &ParamValue) -> Option<Literal> {
    match value {
        ParamValue::Bool(b) => Some(Literal::Bool(*b)),
        ParamValue::Int(i) => Some(Literal::from(*i)),
        ParamValue::Float(f) => Some(Literal::from(*f)),
        ParamValue::Text(s) => Some(Literal::Text(s.clone())),
        ParamValue::List(_) | ParamValue::Nested(_) => None,
    }
}

pub(super) fn between(column: &'static str, low: f64, high: f64) -> Predicate {
    Predicate::and([
        Predicate::compare(column, Op::Gte, low),
        Predicate::compare(column, Op::Lte, high),
    ])
}

// ============================================================================
// Pattern lowering
// ============================================================================

/// Lowers a pattern against columns: each term matches if any column
/// contains it.
struct ColumnLowering<'c> {
    columns: &'c [&'static str],
}

impl Lower for ColumnLowering<'_> {
    type Output = Predicate;

    fn everything(&mut self) -> Predicate {
        Predicate::True
    }

    fn term(&mut self, like: &str) -> Predicate {
        Predicate::or(self.columns.iter().map(|column| Predicate::like(*column, like)))
    }

    fn all(&mut self, parts: Vec<Predicate>) -> Predicate {
        Predicate::and(parts)
    }

    fn any(&mut self, parts: Vec<Predicate>) -> Predicate {
        Predicate::or(parts)
    }

    fn not(&mut self, part: Predicate) -> Predicate {
        Predicate::not(part)
    }
}

pub(super) fn lower_pattern(expr: &BooleanExpr, columns: &[&'static str]) -> Predicate {
    expr.lower(&mut ColumnLowering { columns })
}

// ============================================================================
// Identity and attribution
// ============================================================================

/// An explicit id set. Empty means no results, never "everything".
pub(super) fn id_in_set(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let ids = list_value(name, value)?
        .iter()
        .map(|v| v.as_int().ok_or_else(|| QueryError::shape(name.as_str(), "a list of ids", v)))
        .collect::<Result<Vec<Id>>>()?;
    Ok(Predicate::in_set("id", ids))
}

pub(super) fn by_users(cx: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let ids = resolve_ids(cx.directory, name.as_str(), RecordType::User, list_value(name, value)?)?;
    follow(rt, &["user"], ids)
}

/// Free-text search across the type's searched columns.
pub(super) fn pattern(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let expr = tokenize(text_value(name, value)?);
    Ok(lower_pattern(&expr, schema::search_columns(rt)))
}

// ============================================================================
// Links to other records
// ============================================================================

/// Association path a linking filter follows from `rt`.
fn link_path(name: FilterName, rt: RecordType) -> Option<&'static [&'static str]> {
    use FilterName as F;
    use RecordType as T;

    Some(match (name, rt) {
        (F::Locations, T::Location) => &[],
        (F::Locations, _) => &["location"],
        (F::Herbaria, T::HerbariumRecord) => &["herbarium"],
        (F::Herbaria, _) => &["herbarium_records", "herbarium"],
        (F::HerbariumRecords, _) => &["herbarium_records"],
        (F::FieldSlips, _) => &["field_slips"],
        (F::Projects, T::FieldSlip) => &["project"],
        (F::Projects, _) => &["projects"],
        (F::SpeciesLists, T::Name) => &["observations", "species_lists"],
        (F::SpeciesLists, _) => &["species_lists"],
        (F::Observations, T::Sequence | T::ExternalLink | T::FieldSlip | T::Naming) => &["observation"],
        (F::Observations, _) => &["observations"],
        (F::Members, _) => &["members"],
        _ => return None,
    })
}

/// Record type reached by following `path` from `rt`.
fn path_target(rt: RecordType, path: &[&str]) -> Option<RecordType> {
    path.iter()
        .try_fold(rt, |at, step| schema::association(at, step).map(|a| a.target))
}

/// Rows linked through `path` to one of `ids`. A final foreign key on the
/// row itself becomes a plain membership test.
pub(super) fn follow(rt: RecordType, path: &[&str], ids: Vec<Id>) -> Result<Predicate> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(Predicate::in_set("id", ids));
    };
    let assoc = schema::association(rt, first).ok_or_else(|| QueryError::UnknownAssociation {
        record_type: rt,
        key: first.to_string(),
    })?;
    if let (true, Link::BelongsTo(column)) = (rest.is_empty(), assoc.link) {
        return Ok(Predicate::in_set(column, ids));
    }
    Ok(Predicate::exists(assoc, follow(assoc.target, rest, ids)?))
}

/// `locations`, `projects`, `herbaria`, `observations` and friends.
pub(super) fn linked_records(
    cx: &FilterCx<'_>,
    name: FilterName,
    rt: RecordType,
    value: &ParamValue,
) -> Result<Predicate> {
    let not_applicable = || QueryError::NotApplicable {
        record_type: rt,
        name: name.as_str(),
    };
    let path = link_path(name, rt).ok_or_else(not_applicable)?;
    let target = path_target(rt, path).ok_or_else(not_applicable)?;
    let ids = resolve_ids(cx.directory, name.as_str(), target, list_value(name, value)?)?;
    follow(rt, path, ids)
}

// ============================================================================
// Presence
// ============================================================================

/// `has_<field>`: `false` means the field is empty.
pub(super) fn presence(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let wanted = bool_value(name, value)?;
    let column = field_column(name, rt, presence_column(name))?;

    let empty = match (name, rt) {
        // Observation notes are serialized fields; `{}` is the empty record.
        (FilterName::HasNotes, RecordType::Observation) => {
            Predicate::or([Predicate::blank(column), Predicate::eq(column, "{}")])
        }
        _ => match schema::column(rt, column).map(|c| c.kind) {
            Some(ColumnKind::Text) => Predicate::blank(column),
            _ => Predicate::is_null(column),
        },
    };
    Ok(if wanted { Predicate::not(empty) } else { empty })
}

fn presence_column(name: FilterName) -> &'static str {
    match name {
        FilterName::HasAuthor => "author",
        FilterName::HasCitation => "citation",
        FilterName::HasClassification => "classification",
        FilterName::HasDefaultDescription => "description_id",
        FilterName::HasSummary => "summary",
        FilterName::HasSynonyms => "synonym_id",
        _ => "notes",
    }
}

/// `has_comments`, `has_observations` and the other association flags.
///
/// Only `has_descriptions` treats `false` as "has none". For the others
/// `false` matches every record, which is how these flags have always
/// behaved.
pub(super) fn has_associated(
    _: &FilterCx<'_>,
    name: FilterName,
    rt: RecordType,
    value: &ParamValue,
) -> Result<Predicate> {
    let wanted = bool_value(name, value)?;
    let assoc_name = match name {
        FilterName::HasComments => "comments",
        FilterName::HasSequences => "sequences",
        FilterName::HasSpeciesLists => "species_lists",
        FilterName::HasDescriptions => "descriptions",
        _ => "observations",
    };
    let assoc = schema::association(rt, assoc_name).ok_or(QueryError::NotApplicable {
        record_type: rt,
        name: name.as_str(),
    })?;
    let exists = Predicate::exists(assoc, Predicate::True);
    Ok(match (wanted, name) {
        (true, _) => exists,
        (false, FilterName::HasDescriptions) => Predicate::not(exists),
        (false, _) => Predicate::True,
    })
}

/// A boolean column compared directly.
pub(super) fn flag(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let wanted = bool_value(name, value)?;
    let column = match name {
        FilterName::IsPublic => "public",
        other => other.as_str(),
    };
    Ok(Predicate::eq(field_column(name, rt, column)?, wanted))
}

pub(super) fn has_contribution(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let contributed = Predicate::compare("contribution", Op::Gt, 0);
    Ok(if bool_value(name, value)? {
        contributed
    } else {
        Predicate::not(contributed)
    })
}

pub(super) fn nonpersonal(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    Ok(if bool_value(name, value)? {
        Predicate::is_null("personal_user_id")
    } else {
        Predicate::not_null("personal_user_id")
    })
}

// ============================================================================
// Per-field search and exact values
// ============================================================================

/// Column a `<field>_has` filter searches, if the type has it.
pub(super) fn has_column(rt: RecordType, field: &str) -> Option<&'static str> {
    let field = match (rt, field) {
        (RecordType::Comment, "content") => "comment",
        (RecordType::CollectionNumber, "collector") => "name",
        (_, field) => field,
    };
    schema::column(rt, field).map(|c| c.name)
}

/// `<field>_has`: the text is a search pattern over that one field.
pub(super) fn field_has(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let expr = tokenize(text_value(name, value)?);
    let field = name.as_str().trim_end_matches("_has");

    let columns: Vec<&'static str> = match (name, rt) {
        (FilterName::ContentHas, RecordType::NameDescription | RecordType::LocationDescription) => {
            schema::search_columns(rt).to_vec()
        }
        _ => vec![has_column(rt, field).ok_or(QueryError::NotApplicable {
            record_type: rt,
            name: name.as_str(),
        })?],
    };
    Ok(lower_pattern(&expr, &columns))
}

pub(super) fn comments_has(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let expr = tokenize(text_value(name, value)?);
    let assoc = schema::association(rt, "comments").ok_or(QueryError::NotApplicable {
        record_type: rt,
        name: name.as_str(),
    })?;
    Ok(Predicate::exists(assoc, lower_pattern(&expr, &["summary", "comment"])))
}

/// Exact match against one of the listed values.
pub(super) fn one_of(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let column = match name {
        FilterName::Collectors => "name",
        FilterName::Numbers => "number",
        FilterName::ExternalSites => "external_site_id",
        FilterName::License => "license_id",
        FilterName::Sources => "source_type",
        other => other.as_str(),
    };
    let column = field_column(name, rt, column)?;
    let values = list_value(name, value)?
        .iter()
        .map(|v| literal(v).ok_or_else(|| QueryError::shape(name.as_str(), "a list of values", v)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::in_set(column, values))
}

/// Comments on one record.
pub(super) fn target(_: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let fail = || QueryError::shape(name.as_str(), "a map with type and id", value);
    let map = value.as_map().ok_or_else(fail)?;
    let model = map.get("type").and_then(ParamValue::as_str).ok_or_else(fail)?;
    let id = map.get("id").and_then(ParamValue::as_int).ok_or_else(fail)?;
    Ok(Predicate::and([
        Predicate::eq("target_type", model),
        Predicate::eq("target_id", id),
    ]))
}

/// Comments or log entries about the listed kinds of record.
pub(super) fn types(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let kinds = list_value(name, value)?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| QueryError::shape(name.as_str(), "record type tags", v))
                .and_then(RecordType::parse)
        })
        .collect::<Result<Vec<_>>>()?;

    match rt {
        RecordType::RssLog => {
            let mut parts = Vec::new();
            for kind in kinds {
                let column = format!("{}_id", kind.tag());
                let column = field_column(name, rt, &column)?;
                parts.push(Predicate::not_null(column));
            }
            Ok(Predicate::or(parts))
        }
        _ => Ok(Predicate::in_set(
            "target_type",
            kinds.into_iter().map(RecordType::model_name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowering_ors_terms_across_columns() {
        let pred = lower_pattern(&tokenize("dobbs -notes"), &["where", "notes"]);
        assert_eq!(
            pred,
            Predicate::and([
                Predicate::or([
                    Predicate::like("where", "%dobbs%"),
                    Predicate::like("notes", "%dobbs%"),
                ]),
                Predicate::not(Predicate::or([
                    Predicate::like("where", "%notes%"),
                    Predicate::like("notes", "%notes%"),
                ])),
            ])
        );
    }

    #[test]
    fn blank_pattern_is_true() {
        assert_eq!(lower_pattern(&tokenize("  "), &["notes"]), Predicate::True);
    }

    #[test]
    fn follow_uses_foreign_key_when_possible() {
        assert_eq!(
            follow(RecordType::Observation, &["location"], vec![1, 2]).unwrap(),
            Predicate::in_set("location_id", [1, 2])
        );
        let pred = follow(RecordType::Observation, &["herbarium_records", "herbarium"], vec![4]).unwrap();
        match pred {
            Predicate::Exists { association, filter } => {
                assert_eq!(association.name, "herbarium_records");
                assert_eq!(*filter, Predicate::in_set("herbarium_id", [4]));
            }
            other => panic!("expected Exists, got {other:?}"),
        }
    }

    #[test]
    fn every_link_path_resolves() {
        for name in FilterName::ALL {
            for rt in RecordType::ALL {
                if let Some(path) = link_path(*name, rt) {
                    let applies = super::super::FilterCatalog::global()
                        .lookup(rt, name.as_str())
                        .is_ok();
                    if applies {
                        assert!(path_target(rt, path).is_some(), "{name} on {rt}");
                    }
                }
            }
        }
    }
}
