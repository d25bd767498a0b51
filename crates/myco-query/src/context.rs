//! Per-request inputs that affect compilation but are not parameters.
//!
//! A few filters and orders depend on who is asking or how they like place
//! names written. Those inputs are passed explicitly as a [`QueryContext`].
//! The compiler records which parts it actually read, and only those parts
//! enter the fingerprint and the persisted record.

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::param::{ParamMap, ParamValue};
use crate::value::Id;

/// How location names are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationFormat {
    /// Most specific first: `Albion, California, USA`.
    #[default]
    Postal,
    /// Most general first: `USA, California, Albion`.
    Scientific,
}

impl LocationFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationFormat::Postal => "postal",
            LocationFormat::Scientific => "scientific",
        }
    }

    pub fn parse(input: &str) -> Option<LocationFormat> {
        match input {
            "postal" => Some(LocationFormat::Postal),
            "scientific" => Some(LocationFormat::Scientific),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    /// User the query runs for, if any.
    pub current_user: Option<Id>,
    pub location_format: LocationFormat,
}

/// Which parts of a [`QueryContext`] a compile read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextUse {
    pub current_user: bool,
    pub location_format: bool,
}

impl ContextUse {
    pub fn any(self) -> bool {
        self.current_user || self.location_format
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: Id) -> Self {
        self.current_user = Some(user);
        self
    }

    pub fn with_location_format(mut self, format: LocationFormat) -> Self {
        self.location_format = format;
        self
    }

    /// The parts of this context named by `used`, as a parameter map.
    pub fn restricted(&self, used: ContextUse) -> ParamMap {
        let mut map = ParamMap::new();
        if used.current_user {
            if let Some(user) = self.current_user {
                map.insert("current_user".into(), ParamValue::Int(user));
            }
        }
        if used.location_format {
            map.insert(
                "location_format".into(),
                ParamValue::Text(self.location_format.as_str().into()),
            );
        }
        map
    }

    /// Rebuilds a context from a map produced by [`restricted`](Self::restricted).
    pub fn from_params(map: &ParamMap) -> Result<QueryContext> {
        let mut context = QueryContext::default();
        for (key, value) in map {
            match key.as_str() {
                "current_user" => {
                    context.current_user = Some(
                        value
                            .as_int()
                            .ok_or_else(|| QueryError::shape("current_user", "a user id", value))?,
                    );
                }
                "location_format" => {
                    context.location_format = value
                        .as_str()
                        .and_then(LocationFormat::parse)
                        .ok_or_else(|| {
                            QueryError::shape("location_format", "postal or scientific", value)
                        })?;
                }
                other => return Err(QueryError::shape("context", "a known context key", other)),
            }
        }
        Ok(context)
    }
}
