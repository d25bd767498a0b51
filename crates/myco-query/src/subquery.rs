//! Nested `<association>_query` maps.
//!
//! A subquery restricts the parent to rows with at least one associated row
//! matching the nested parameters. Some nested filters have an equivalent
//! on the parent type that avoids walking the association; those are
//! hoisted out and applied to the parent directly. The existence join stays
//! even when nothing is left to filter inside it.

use crate::compiler::Compiler;
use crate::error::{QueryError, Result};
use crate::filters::{FilterCatalog, FilterCx};
use crate::param::{ParamMap, ParamValue};
use crate::predicate::Predicate;
use crate::schema::{self, RecordType};

/// Filters moved from a subquery onto the parent: `(parent, key, filters)`.
///
/// `by_users` stays nested: on the parent it would match the parent's own
/// creator instead of the observer.
pub const HOISTED: &[(RecordType, &str, &[&str])] = &[
    (RecordType::Location, "observation_query", &["locations", "region"]),
    (RecordType::Name, "observation_query", &["names", "clade", "lichen"]),
    (RecordType::Name, "description_query", &["names"]),
];

/// Name lookup flags that only make sense against observations' namings.
const OBSERVATION_ONLY_FLAGS: &[&str] = &["exclude_consensus", "include_all_name_proposals"];

/// Filters hoisted out of `key` when nested under `parent`.
pub fn hoisted_filters(parent: RecordType, key: &str) -> &'static [&'static str] {
    HOISTED
        .iter()
        .find(|(rt, k, _)| *rt == parent && *k == key)
        .map(|(_, _, filters)| *filters)
        .unwrap_or(&[])
}

fn can_hoist(filter: &str, value: &ParamValue) -> bool {
    match (filter, value) {
        ("names", ParamValue::Nested(lookup)) => {
            !OBSERVATION_ONLY_FLAGS.iter().any(|flag| lookup.contains_key(*flag))
        }
        _ => true,
    }
}

/// Splits a nested map into hoisted entries and the rest.
pub fn split(parent: RecordType, key: &str, nested: &ParamMap) -> (ParamMap, ParamMap) {
    let hoistable = hoisted_filters(parent, key);
    nested
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(k, v)| hoistable.contains(&k.as_str()) && can_hoist(k, v))
}

/// Compiles `nested` (already normalized) under `key` and returns the
/// predicate to AND onto the parent.
pub(crate) fn merge(
    compiler: &Compiler<'_>,
    cx: &FilterCx<'_>,
    parent: RecordType,
    key: &str,
    nested: &ParamMap,
) -> Result<Predicate> {
    let association = schema::association_for_subquery(parent, key).ok_or_else(|| QueryError::UnknownAssociation {
        record_type: parent,
        key: key.to_string(),
    })?;
    let (hoisted, remaining) = split(parent, key, nested);

    let catalog = FilterCatalog::global();
    let mut parts = Vec::with_capacity(hoisted.len() + 1);
    for (name, value) in &hoisted {
        let spec = catalog.lookup(parent, name)?;
        parts.push(spec.build(cx, parent, value)?);
    }
    if !hoisted.is_empty() {
        tracing::debug!(
            %parent,
            key,
            hoisted = ?hoisted.keys().collect::<Vec<_>>(),
            "hoisted subquery filters onto parent"
        );
    }

    let inner = compiler.predicate(cx, association.target, &remaining)?;
    parts.push(Predicate::exists(association, inner));
    Ok(Predicate::and(parts))
}
