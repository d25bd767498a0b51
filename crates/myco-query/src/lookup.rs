//! Resolving record references given by id or by a human-readable key.
//!
//! Filters such as `by_users`, `projects` or `herbaria` accept ids and
//! strings mixed. Ids pass through; strings are matched against the target
//! type's key columns through the [`Directory`].

use std::collections::BTreeSet;

use crate::error::{QueryError, Result};
use crate::param::ParamValue;
use crate::predicate::Predicate;
use crate::schema::RecordType;
use crate::store::Directory;
use crate::value::Id;

/// Extracts `login` from `Full Name <login>`.
fn bracketed_login(key: &str) -> Option<&str> {
    let inner = key.strip_suffix('>')?;
    let (_, login) = inner.rsplit_once('<')?;
    let login = login.trim();
    (!login.is_empty()).then_some(login)
}

/// Predicate matching `record_type` rows identified by `key`.
pub fn key_predicate(filter: &str, record_type: RecordType, key: &str) -> Result<Predicate> {
    let key = key.trim();
    let pred = match record_type {
        RecordType::User => match bracketed_login(key) {
            Some(login) => Predicate::eq("login", login),
            None => Predicate::or([Predicate::eq("login", key), Predicate::eq("name", key)]),
        },
        RecordType::Location => Predicate::or([
            Predicate::eq("name", key),
            Predicate::eq("scientific_name", key),
        ]),
        RecordType::Project | RecordType::SpeciesList | RecordType::Article => {
            Predicate::eq("title", key)
        }
        RecordType::Herbarium => {
            Predicate::or([Predicate::eq("code", key), Predicate::eq("name", key)])
        }
        RecordType::HerbariumRecord => Predicate::eq("accession_number", key),
        RecordType::FieldSlip => Predicate::eq("code", key),
        RecordType::Name => Predicate::or([
            Predicate::eq("search_name", key),
            Predicate::eq("text_name", key),
        ]),
        RecordType::GlossaryTerm => Predicate::eq("name", key),
        _ => {
            return Err(QueryError::shape(
                filter,
                "ids",
                format!("'{key}' ({record_type} has no lookup key)"),
            ))
        }
    };
    Ok(pred)
}

/// Resolves a list of ids and keys to ids, sorted and deduplicated.
///
/// Fails with [`QueryError::EmptyLookup`] when nothing resolves.
pub fn resolve_ids(
    directory: &dyn Directory,
    filter: &'static str,
    record_type: RecordType,
    values: &[ParamValue],
) -> Result<Vec<Id>> {
    let mut ids = BTreeSet::new();
    let mut keys = Vec::new();
    for value in values {
        match value {
            ParamValue::Int(id) => {
                ids.insert(*id);
            }
            ParamValue::Text(key) => keys.push(key_predicate(filter, record_type, key)?),
            other => return Err(QueryError::shape(filter, "record ids or names", other)),
        }
    }

    if !keys.is_empty() {
        let found = directory.ids_where(record_type, &Predicate::or(keys))?;
        tracing::trace!(filter, %record_type, found = found.len(), "resolved lookup keys");
        ids.extend(found);
    }

    if ids.is_empty() {
        return Err(QueryError::EmptyLookup { filter });
    }
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_keys() {
        assert_eq!(
            key_predicate("by_users", RecordType::User, "Mary Smith <msmith>").unwrap(),
            Predicate::eq("login", "msmith")
        );
        assert_eq!(
            key_predicate("by_users", RecordType::User, "msmith").unwrap(),
            Predicate::or([Predicate::eq("login", "msmith"), Predicate::eq("name", "msmith")])
        );
    }

    #[test]
    fn types_without_keys_reject_strings() {
        let err = key_predicate("observations", RecordType::Observation, "obs").unwrap_err();
        assert!(matches!(err, QueryError::InvalidShape { .. }));
    }
}
