//! Myco query - declarative queries over a mycology record store.
//!
//! A query is a record type plus a map of named filters. The engine
//! validates and normalizes the map, compiles it into a predicate tree with
//! a resolved sort order, fingerprints the result, and hands it to a
//! [`Store`] for execution. Results are fetched lazily and cached per
//! fingerprint.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use myco_query::{params, EngineConfig, MemoryStore, QueryEngine, RecordType};
//!
//! let data = MemoryStore::from_json_str(r#"{
//!     "records": {
//!         "user": [{"id": 1, "login": "rolf"}, {"id": 2, "login": "mary"}],
//!         "observation": [
//!             {"id": 10, "user_id": 1, "when": "2015-12-25"},
//!             {"id": 11, "user_id": 2, "when": "2016-01-02"}
//!         ]
//!     }
//! }"#).unwrap();
//!
//! let engine = QueryEngine::in_memory(Arc::new(data), EngineConfig::default());
//! let query = engine
//!     .lookup(RecordType::Observation, &params! { "by_users" => vec!["mary"] }, &engine.context())
//!     .unwrap();
//!
//! assert_eq!(query.result_ids().unwrap(), &[11]);
//! assert_eq!(query.fingerprint().as_str().len(), 64);
//! ```
//!
//! # Parameters
//!
//! Keys are filter names (`date`, `names`, `in_box`, `pattern`, ...), the
//! ordering keys `by` and `order_by`, or `<association>_query` holding a
//! nested map that restricts the query to rows with a matching associated
//! row. Blank strings are dropped. Unknown keys, filters that do not apply
//! to the record type and values of the wrong shape are errors raised
//! before the store is touched.
//!
//! # Execution
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Compiler`] | params to [`QuerySpec`] |
//! | [`Store`] | runs a spec, returns ordered ids |
//! | [`Directory`] | lookups needed while compiling (names, logins, taxa) |
//! | [`QueryEngine`] | compile, cache, save, resume, coerce |
//! | [`MemoryStore`] | both collaborators over rows loaded from JSON or YAML |

mod cache;
mod compiler;
mod config;
mod context;
mod engine;
mod error;
mod fingerprint;
mod lookup;
mod memory;
mod op;
mod ordering;
mod param;
mod predicate;
mod query;
mod record;
mod shape;
mod store;
mod subquery;
mod value;

pub mod filters;
pub mod schema;

pub use cache::QueryCache;
pub use compiler::{Compiler, QueryBuilder, QuerySpec, BY, ORDER_BY};
pub use config::{EngineConfig, CONFIG_ENV};
pub use context::{LocationFormat, QueryContext};
pub use engine::QueryEngine;
pub use error::{QueryError, Result};
pub use filters::{FilterCatalog, FilterName, FilterSpec};
pub use fingerprint::Fingerprint;
pub use lookup::key_predicate;
pub use memory::{Fixture, JoinRow, MemoryStore, Row};
pub use op::Op;
pub use ordering::{fold, parse_by, Dir, OrderKey, OrderingResolver, SortSource, SortTerm};
pub use param::{params_from_json, params_to_json, ParamMap, ParamValue};
pub use predicate::{Column, DatePart, Predicate};
pub use query::{Query, QueryState};
pub use record::{JsonFileRecords, MemoryRecords, QueryRecord, QueryRecordStore};
pub use schema::{Association, ColumnKind, Link, RecordType};
pub use shape::{Scalar, Shape};
pub use store::{Directory, Store, Taxon};
pub use subquery::{hoisted_filters, HOISTED};
pub use value::{Id, Literal, Number, Value};
