//! Observation-specific filters: identification state, confidence,
//! coordinates and structured notes.

use myco_pattern::escape_like;

use super::common::{between, bool_value, float_range, list_value, text_value};
use super::{FilterCx, FilterName};
use crate::error::{QueryError, Result};
use crate::op::Op;
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::{self, RecordType};

/// Observations still waiting for an identification.
fn unnamed(cx: &FilterCx<'_>) -> Predicate {
    match cx.directory.unknown_name_id() {
        Some(unknown) => Predicate::or([Predicate::is_null("name_id"), Predicate::eq("name_id", unknown)]),
        None => Predicate::is_null("name_id"),
    }
}

pub(super) fn has_name(cx: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    let unnamed = unnamed(cx);
    Ok(if bool_value(name, value)? {
        Predicate::not(unnamed)
    } else {
        unnamed
    })
}

/// `needs_naming`: unnamed or disputed, and not the current user's own.
///
/// Only `true` filters anything.
pub(super) fn needs_naming(cx: &FilterCx<'_>, name: FilterName, _: RecordType, value: &ParamValue) -> Result<Predicate> {
    if !bool_value(name, value)? {
        return Ok(Predicate::True);
    }
    let doubtful = Predicate::or([
        unnamed(cx),
        Predicate::is_null("vote_cache"),
        Predicate::compare("vote_cache", Op::Lte, 0.0),
    ]);
    let not_mine = match cx.current_user() {
        Some(user) => Predicate::compare("user_id", Op::Ne, user),
        None => Predicate::True,
    };
    Ok(Predicate::and([doubtful, not_mine]))
}

/// `confidence`: community vote within a range.
pub(super) fn confidence(_: &FilterCx<'_>, name: FilterName, rt: RecordType, value: &ParamValue) -> Result<Predicate> {
    let (low, high) = float_range(name, value)?;
    let votes = between("vote_cache", low, high);
    match rt {
        RecordType::Image => {
            let observations = schema::association(rt, "observations").ok_or(QueryError::NotApplicable {
                record_type: rt,
                name: name.as_str(),
            })?;
            Ok(Predicate::exists(observations, votes))
        }
        _ => Ok(votes),
    }
}

pub(super) fn has_public_lat_lng(
    _: &FilterCx<'_>,
    name: FilterName,
    _: RecordType,
    value: &ParamValue,
) -> Result<Predicate> {
    // An unset `gps_hidden` counts as visible.
    let public = Predicate::and([
        Predicate::not_null("lat"),
        Predicate::not(Predicate::eq("gps_hidden", true)),
    ]);
    Ok(if bool_value(name, value)? {
        public
    } else {
        Predicate::not(public)
    })
}

/// `has_notes_fields`: any of the named note fields is filled in.
///
/// Notes are stored serialized with one `:field:` key per filled field.
pub(super) fn has_notes_fields(
    _: &FilterCx<'_>,
    name: FilterName,
    _: RecordType,
    value: &ParamValue,
) -> Result<Predicate> {
    let fields = list_value(name, value)?
        .iter()
        .map(|v| text_value(name, v))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::or(fields.into_iter().map(|field| {
        let key = field.trim().replace(' ', "_");
        Predicate::like("notes", format!("%:{}:%", escape_like(&key)))
    })))
}
