//! Error types for the query engine.

use thiserror::Error;

use crate::schema::RecordType;

/// Errors that can occur when compiling, executing or persisting queries.
///
/// The structural variants (`Unknown*`, `NotApplicable`, `InvalidShape`)
/// are raised by the compiler before the store is touched.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Record type tag is not registered.
    #[error("unknown record type: {0}")]
    UnknownType(String),

    /// Filter name is not registered for any record type.
    #[error("unknown filter '{name}' for {record_type}")]
    UnknownFilter {
        record_type: RecordType,
        name: String,
    },

    /// Filter exists but is not defined for this record type.
    #[error("filter '{name}' does not apply to {record_type}")]
    NotApplicable {
        record_type: RecordType,
        name: &'static str,
    },

    /// Value does not have the shape the filter accepts.
    #[error("invalid value for '{filter}': expected {expected}, got {found}")]
    InvalidShape {
        filter: String,
        expected: &'static str,
        found: String,
    },

    /// A `*_query` key that names no association of the record type.
    #[error("{record_type} has no association for '{key}'")]
    UnknownAssociation { record_type: RecordType, key: String },

    /// Order key or column that cannot order this record type.
    #[error("cannot order {record_type} by '{key}'")]
    UnknownOrder { record_type: RecordType, key: String },

    /// A lookup resolved to no records.
    ///
    /// Never escapes the compiler: filters turn it into an always-false
    /// predicate.
    #[error("lookup for '{filter}' matched nothing")]
    EmptyLookup { filter: &'static str },

    /// No saved query has this fingerprint.
    #[error("no saved query with fingerprint {0}")]
    UnknownFingerprint(String),

    /// Failure reported by a store or directory implementation.
    #[error("store error: {0}")]
    Store(String),

    /// Regular expression produced by a filter failed to compile.
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl QueryError {
    /// Returns `true` for errors caused by the caller's parameters.
    ///
    /// A web layer maps these to a 4xx response.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownType(_)
                | QueryError::UnknownFilter { .. }
                | QueryError::NotApplicable { .. }
                | QueryError::InvalidShape { .. }
                | QueryError::UnknownAssociation { .. }
                | QueryError::UnknownOrder { .. }
                | QueryError::UnknownFingerprint(_)
        )
    }

    pub(crate) fn shape(filter: &str, expected: &'static str, found: impl std::fmt::Display) -> Self {
        QueryError::InvalidShape {
            filter: filter.to_string(),
            expected,
            found: found.to_string(),
        }
    }
}

/// Result type for query engine operations.
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors() {
        assert!(QueryError::UnknownType("fungus".into()).is_client_error());
        assert!(QueryError::NotApplicable {
            record_type: RecordType::Comment,
            name: "region",
        }
        .is_client_error());
        assert!(!QueryError::Store("down".into()).is_client_error());
        assert!(!QueryError::EmptyLookup { filter: "names" }.is_client_error());
    }

    #[test]
    fn messages() {
        let err = QueryError::UnknownFilter {
            record_type: RecordType::Observation,
            name: "colour".into(),
        };
        assert_eq!(err.to_string(), "unknown filter 'colour' for Observation");

        let err = QueryError::shape("has_notes", "a boolean", "\"maybe\"");
        assert_eq!(
            err.to_string(),
            "invalid value for 'has_notes': expected a boolean, got \"maybe\""
        );
    }
}
