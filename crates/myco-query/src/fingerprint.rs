//! Canonical query identity.
//!
//! A fingerprint is the SHA-256 of the canonical JSON rendering of a query:
//! `{"model": <type tag>, <param>: <value>, ...}` with every object's keys
//! sorted. Context values the compile actually read are added under
//! `"context"`; a query that never looked at the context fingerprints the
//! same for every caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use sha2::{Digest, Sha256};

use crate::error::{QueryError, Result};
use crate::param::{params_to_json, ParamMap};
use crate::schema::RecordType;

/// Lowercase hex SHA-256 of a canonical query.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprints normalized params, plus whatever context was read.
    pub fn of(record_type: RecordType, params: &ParamMap, context: &ParamMap) -> Fingerprint {
        let canonical = canonical_json(record_type, params, context);
        Fingerprint(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Accepts a fingerprint previously rendered with `Display`.
    pub fn parse(text: &str) -> Result<Fingerprint> {
        let text = text.trim();
        let valid = text.len() == 64 && text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(QueryError::UnknownFingerprint(text.to_string()));
        }
        Ok(Fingerprint(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.0[..self.0.len().min(12)])
    }
}

/// The string that gets hashed.
pub fn canonical_json(record_type: RecordType, params: &ParamMap, context: &ParamMap) -> String {
    let mut object = match params_to_json(params) {
        Json::Object(map) => map,
        _ => Map::new(),
    };
    object.insert("model".into(), Json::String(record_type.tag().into()));
    if !context.is_empty() {
        object.insert("context".into(), params_to_json(context));
    }
    // serde_json keeps object keys sorted, so this rendering is canonical.
    Json::Object(object).to_string()
}
