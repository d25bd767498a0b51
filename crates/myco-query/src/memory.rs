//! In-memory [`Store`] and [`Directory`] over typed rows.
//!
//! Rows are loaded from a fixture document (JSON or YAML) shaped like:
//!
//! ```json
//! {
//!   "unknown_name_id": 1,
//!   "records": {
//!     "name": [{"id": 1, "text_name": "Fungi", "rank": "Kingdom"}],
//!     "observation": [{"id": 10, "name_id": 1, "when": "2015-12-25"}]
//!   },
//!   "joins": {
//!     "observation_images": [{"observation_id": 10, "image_id": 5}]
//!   }
//! }
//! ```
//!
//! Every column is checked against the schema catalog when loaded. Missing
//! columns are null.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use myco_pattern::like_matches;
use parking_lot::{Mutex, RwLock};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value as Json;

use crate::compiler::QuerySpec;
use crate::error::{QueryError, Result};
use crate::ordering::{compare_sort_values, fold, SortSource, SortTerm};
use crate::predicate::{Column, DatePart, Predicate};
use crate::schema::{self, Association, ColumnKind, Link, RecordType, JOIN_TABLES};
use crate::store::{Directory, Store, Taxon};
use crate::value::{compare_values, Id, Literal, Number, Value};

/// One stored row. Absent columns are null.
pub type Row = BTreeMap<&'static str, Literal>;

/// A join-table row, column name to id.
pub type JoinRow = BTreeMap<String, Id>;

/// Fixture document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub unknown_name_id: Option<Id>,
    #[serde(default)]
    pub records: BTreeMap<RecordType, Vec<serde_json::Map<String, Json>>>,
    #[serde(default)]
    pub joins: BTreeMap<String, Vec<JoinRow>>,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    index: HashMap<Id, usize>,
}

impl Table {
    fn get(&self, id: Id) -> Option<&Row> {
        self.index.get(&id).and_then(|i| self.rows.get(*i))
    }

    fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row_id(row).map(|id| (id, i)))
            .collect();
    }
}

#[derive(Debug, Default)]
struct Data {
    tables: BTreeMap<RecordType, Table>,
    joins: BTreeMap<&'static str, Vec<JoinRow>>,
    unknown_name_id: Option<Id>,
}

impl Data {
    fn rows(&self, record_type: RecordType) -> &[Row] {
        self.tables
            .get(&record_type)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    fn row(&self, record_type: RecordType, id: Id) -> Option<&Row> {
        self.tables.get(&record_type).and_then(|t| t.get(id))
    }
}

/// Case-insensitive regexes, compiled once per pattern.
#[derive(Debug, Default)]
struct RegexCache(Mutex<HashMap<String, Regex>>);

impl RegexCache {
    fn get(&self, pattern: &str) -> Result<Regex> {
        let mut cache = self.0.lock();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

/// Rows held in memory, evaluated by walking predicates directly.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Data>,
    regexes: RegexCache,
}

fn row_id(row: &Row) -> Option<Id> {
    row.get("id").and_then(|id| id.as_value().as_id())
}

fn store_error(record_type: RecordType, column: &str, expected: &str, found: &Json) -> QueryError {
    QueryError::Store(format!("{record_type}.{column}: expected {expected}, got {found}"))
}

fn parse_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%SZ"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Converts one fixture value into the column's storage type.
fn literal_for(record_type: RecordType, column: &str, kind: ColumnKind, value: &Json) -> Result<Option<Literal>> {
    if value.is_null() {
        return Ok(None);
    }
    let fail = |expected| store_error(record_type, column, expected, value);
    let literal = match kind {
        ColumnKind::Id | ColumnKind::Ref(_) | ColumnKind::Int => {
            Literal::from(value.as_i64().ok_or_else(|| fail("an integer"))?)
        }
        ColumnKind::Float => Literal::from(value.as_f64().ok_or_else(|| fail("a number"))?),
        ColumnKind::Text => Literal::from(value.as_str().ok_or_else(|| fail("a string"))?),
        ColumnKind::Bool => Literal::from(value.as_bool().ok_or_else(|| fail("a boolean"))?),
        ColumnKind::Date => Literal::from(
            value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .ok_or_else(|| fail("a YYYY-MM-DD date"))?,
        ),
        ColumnKind::Time => Literal::from(value.as_str().and_then(parse_time).ok_or_else(|| fail("a timestamp"))?),
    };
    Ok(Some(literal))
}

fn typed_row(record_type: RecordType, fields: &serde_json::Map<String, Json>) -> Result<Row> {
    let mut row = Row::new();
    for (name, value) in fields {
        let column = schema::column(record_type, name)
            .ok_or_else(|| QueryError::Store(format!("{record_type} has no column '{name}'")))?;
        if let Some(literal) = literal_for(record_type, column.name, column.kind, value)? {
            row.insert(column.name, literal);
        }
    }
    if row_id(&row).is_none() {
        return Err(QueryError::Store(format!("{record_type} row without an id")));
    }
    Ok(row)
}

/// Reads a column, narrowing dates to a part when asked.
fn column_value(row: &Row, column: Column) -> Value<'_> {
    let value = row.get(column.name()).map(Literal::as_value).unwrap_or(Value::Null);
    let Column::Part(_, part) = column else {
        return value;
    };
    let (year, month, day) = match value {
        Value::Date(d) => (d.year(), d.month(), d.day()),
        Value::Time(t) => (t.year(), t.month(), t.day()),
        _ => return Value::Null,
    };
    let n = match part {
        DatePart::Year => year as i64,
        DatePart::Month => month as i64,
        DatePart::Day => day as i64,
    };
    Value::Number(Number::I64(n))
}

/// Predicate evaluation and sorting over a locked snapshot.
struct Eval<'a> {
    data: &'a Data,
    regexes: &'a RegexCache,
}

impl<'a> Eval<'a> {
    /// Rows reached from `row` through `association`.
    fn related(&self, parent: RecordType, row: &Row, association: &Association) -> Vec<&'a Row> {
        let target = association.target;
        let Some(id) = row_id(row) else {
            return Vec::new();
        };
        let id_in = |r: &Row, column: &str| r.get(column).and_then(|v| v.as_value().as_id()) == Some(id);

        match association.link {
            Link::BelongsTo(column) => row
                .get(column)
                .and_then(|v| v.as_value().as_id())
                .and_then(|fk| self.data.row(target, fk))
                .into_iter()
                .collect(),
            Link::HasMany(column) => self.data.rows(target).iter().filter(|r| id_in(*r, column)).collect(),
            Link::Through { table, near, far } => self
                .data
                .joins
                .get(table)
                .map(|pairs| {
                    pairs
                        .iter()
                        .filter(|pair| pair.get(near) == Some(&id))
                        .filter_map(|pair| pair.get(far))
                        .filter_map(|far_id| self.data.row(target, *far_id))
                        .collect()
                })
                .unwrap_or_default(),
            Link::Polymorphic { type_column, id_column } => self
                .data
                .rows(target)
                .iter()
                .filter(|r| r.get(type_column).and_then(|v| v.as_value().as_str()) == Some(parent.model_name()))
                .filter(|r| id_in(*r, id_column))
                .collect(),
        }
    }

    fn matches(&self, record_type: RecordType, row: &Row, predicate: &Predicate) -> Result<bool> {
        Ok(match predicate {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::And(parts) => {
                for part in parts {
                    if !self.matches(record_type, row, part)? {
                        return Ok(false);
                    }
                }
                true
            }
            Predicate::Or(parts) => {
                for part in parts {
                    if self.matches(record_type, row, part)? {
                        return Ok(true);
                    }
                }
                false
            }
            Predicate::Not(inner) => !self.matches(record_type, row, inner)?,
            Predicate::Compare { column, op, value } => {
                compare_values(&column_value(row, *column), &value.as_value()).is_some_and(|o| op.eval_ordering(o))
            }
            Predicate::InSet { column, values } => {
                let have = column_value(row, *column);
                values
                    .iter()
                    .any(|v| compare_values(&have, &v.as_value()) == Some(Ordering::Equal))
            }
            Predicate::IsNull(column) => column_value(row, *column).is_null(),
            Predicate::Blank(column) => column_value(row, *column).is_blank(),
            Predicate::Like { column, pattern } => column_value(row, *column)
                .as_str()
                .is_some_and(|text| like_matches(text, pattern)),
            Predicate::Regex { column, pattern } => match column_value(row, *column).as_str() {
                Some(text) => self.regexes.get(pattern)?.is_match(text),
                None => false,
            },
            Predicate::Columns { left, op, right } => {
                compare_values(&column_value(row, *left), &column_value(row, *right))
                    .is_some_and(|o| op.eval_ordering(o))
            }
            Predicate::Exists { association, filter } => {
                for related in self.related(record_type, row, association) {
                    if self.matches(association.target, related, filter)? {
                        return Ok(true);
                    }
                }
                false
            }
        })
    }

    fn filter(&self, record_type: RecordType, predicate: &Predicate) -> Result<Vec<&'a Row>> {
        let mut out = Vec::new();
        for row in self.data.rows(record_type) {
            if self.matches(record_type, row, predicate)? {
                out.push(row);
            }
        }
        Ok(out)
    }

    /// Value a sort term reads from a row. Paths that fan out take the
    /// smallest value.
    fn sort_value(&self, record_type: RecordType, row: &'a Row, term: &SortTerm) -> Option<Literal> {
        let value = match &term.source {
            SortSource::Position(ids) => {
                let id = row_id(row)?;
                return ids.iter().position(|i| *i == id).map(|p| Literal::from(p as i64));
            }
            SortSource::Field { path, column, fallback } => {
                let mut at = record_type;
                let mut rows = vec![row];
                for step in path.iter() {
                    let association = schema::association(at, step)?;
                    rows = rows
                        .into_iter()
                        .flat_map(|r| self.related(at, r, association))
                        .collect();
                    at = association.target;
                }
                rows.into_iter()
                    .filter_map(|r| {
                        let primary = r.get(column).filter(|v| !v.as_value().is_blank());
                        primary.or_else(|| fallback.and_then(|f| r.get(f)))
                    })
                    .min_by(|a, b| compare_sort_values(&a.as_value(), &b.as_value()))
                    .cloned()?
            }
        };
        match (&value, term.folded) {
            (Literal::Text(text), true) => Some(Literal::Text(fold(text))),
            _ => Some(value),
        }
    }

    fn sort(&self, record_type: RecordType, rows: Vec<&'a Row>, order: &[SortTerm]) -> Vec<Id> {
        let mut keyed: Vec<(Vec<Option<Literal>>, Id)> = rows
            .into_iter()
            .filter_map(|row| {
                let keys = order.iter().map(|term| self.sort_value(record_type, row, term)).collect();
                row_id(row).map(|id| (keys, id))
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), term) in a.iter().zip(b).zip(order) {
                let ordering = term.dir.apply(compare_sort_values(&as_value(x), &as_value(y)));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        keyed.into_iter().map(|(_, id)| id).collect()
    }
}

fn as_value(literal: &Option<Literal>) -> Value<'_> {
    literal.as_ref().map(Literal::as_value).unwrap_or(Value::Null)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Result<Self> {
        let store = MemoryStore::new();
        {
            let mut data = store.data.write();
            data.unknown_name_id = fixture.unknown_name_id;
            for (record_type, rows) in &fixture.records {
                let table = data.tables.entry(*record_type).or_default();
                for fields in rows {
                    table.rows.push(typed_row(*record_type, fields)?);
                }
                table.reindex();
            }
            for (name, rows) in fixture.joins {
                let table = join_table(&name)?;
                data.joins.entry(table).or_default().extend(rows);
            }
            tracing::debug!(
                tables = data.tables.len(),
                rows = data.tables.values().map(|t| t.rows.len()).sum::<usize>(),
                "loaded fixture"
            );
        }
        Ok(store)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_fixture(serde_json::from_str(json)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::from_fixture(serde_yaml::from_str(yaml)?)
    }

    /// Loads a fixture file; `.yaml` and `.yml` are read as YAML, anything
    /// else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// Adds or replaces a row, returning its id.
    pub fn insert(&self, record_type: RecordType, fields: &Json) -> Result<Id> {
        let fields = fields
            .as_object()
            .ok_or_else(|| QueryError::Store(format!("{record_type} row must be an object")))?;
        let row = typed_row(record_type, fields)?;
        let id = row_id(&row).ok_or_else(|| QueryError::Store(format!("{record_type} row without an id")))?;

        let mut data = self.data.write();
        let table = data.tables.entry(record_type).or_default();
        match table.index.get(&id) {
            Some(i) => table.rows[*i] = row,
            None => {
                table.rows.push(row);
                table.reindex();
            }
        }
        Ok(id)
    }

    /// Removes a row. Returns `false` if there was none.
    pub fn remove(&self, record_type: RecordType, id: Id) -> bool {
        let mut data = self.data.write();
        let Some(table) = data.tables.get_mut(&record_type) else {
            return false;
        };
        let before = table.rows.len();
        table.rows.retain(|row| row_id(row) != Some(id));
        table.reindex();
        table.rows.len() < before
    }

    /// Adds a join-table row such as `{"observation_id": 1, "image_id": 2}`.
    pub fn link(&self, table: &str, row: JoinRow) -> Result<()> {
        let table = join_table(table)?;
        self.data.write().joins.entry(table).or_default().push(row);
        Ok(())
    }

    pub fn len(&self, record_type: RecordType) -> usize {
        self.data.read().rows(record_type).len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().tables.values().all(|t| t.rows.is_empty())
    }
}

fn join_table(name: &str) -> Result<&'static str> {
    JOIN_TABLES
        .iter()
        .find(|t| **t == name)
        .copied()
        .ok_or_else(|| QueryError::Store(format!("unknown join table '{name}'")))
}

impl Store for MemoryStore {
    fn execute(&self, spec: &QuerySpec) -> Result<Vec<Id>> {
        let data = self.data.read();
        let eval = Eval {
            data: &data,
            regexes: &self.regexes,
        };
        let rows = eval.filter(spec.record_type, &spec.predicate)?;
        let mut ids = eval.sort(spec.record_type, rows, &spec.order);
        if spec.distinct {
            let mut seen = HashSet::new();
            ids.retain(|id| seen.insert(*id));
        }
        tracing::debug!(record_type = %spec.record_type, results = ids.len(), "executed query");
        Ok(ids)
    }
}

impl Directory for MemoryStore {
    fn ids_where(&self, record_type: RecordType, predicate: &Predicate) -> Result<Vec<Id>> {
        let data = self.data.read();
        let eval = Eval {
            data: &data,
            regexes: &self.regexes,
        };
        let mut ids: Vec<Id> = eval
            .filter(record_type, predicate)?
            .into_iter()
            .filter_map(row_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn taxa_where(&self, predicate: &Predicate) -> Result<Vec<Taxon>> {
        let data = self.data.read();
        let eval = Eval {
            data: &data,
            regexes: &self.regexes,
        };
        let text = |row: &Row, column: &str| row.get(column).and_then(|v| v.as_value().as_str().map(str::to_string));
        let int = |row: &Row, column: &str| row.get(column).and_then(|v| v.as_value().as_id());

        let mut taxa: Vec<Taxon> = eval
            .filter(RecordType::Name, predicate)?
            .into_iter()
            .filter_map(|row| {
                Some(Taxon {
                    id: row_id(row)?,
                    text_name: text(row, "text_name").unwrap_or_default(),
                    rank: text(row, "rank"),
                    synonym_id: int(row, "synonym_id"),
                    correct_spelling_id: int(row, "correct_spelling_id"),
                })
            })
            .collect();
        taxa.sort_by_key(|t| t.id);
        Ok(taxa)
    }

    /// The configured placeholder, or the name `Fungi`.
    fn unknown_name_id(&self) -> Option<Id> {
        let data = self.data.read();
        data.unknown_name_id.or_else(|| {
            data.rows(RecordType::Name)
                .iter()
                .find(|row| row.get("text_name").and_then(|v| v.as_value().as_str()) == Some("Fungi"))
                .and_then(row_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_fixture(
            serde_json::from_value(json!({
                "records": {
                    "observation": [
                        {"id": 1, "when": "2015-12-25", "where": "Albion, California, USA", "thumb_image_id": 5},
                        {"id": 2, "when": "2015-05-01", "where": "Bern, Switzerland"},
                        {"id": 3, "when": "2016-08-30", "where": null},
                    ],
                    "image": [{"id": 5, "vote_cache": 2.5}, {"id": 6}],
                },
                "joins": {
                    "observation_images": [
                        {"observation_id": 1, "image_id": 5},
                        {"observation_id": 1, "image_id": 6},
                        {"observation_id": 2, "image_id": 6},
                    ],
                },
            }))
            .unwrap(),
        )
        .unwrap()
    }

    fn ids(store: &MemoryStore, predicate: Predicate) -> Vec<Id> {
        store.ids_where(RecordType::Observation, &predicate).unwrap()
    }

    #[test]
    fn typed_loading_rejects_unknown_columns() {
        let err = MemoryStore::from_json_str(r#"{"records": {"user": [{"id": 1, "colour": "red"}]}}"#).unwrap_err();
        assert!(matches!(err, QueryError::Store(_)));
        let err = MemoryStore::from_json_str(r#"{"records": {"user": [{"login": "x"}]}}"#).unwrap_err();
        assert!(matches!(err, QueryError::Store(_)));
    }

    #[test]
    fn compare_and_like() {
        let store = store();
        assert_eq!(
            ids(&store, Predicate::compare("when", Op::Gte, NaiveDate::from_ymd_opt(2015, 6, 1).unwrap())),
            vec![1, 3]
        );
        assert_eq!(ids(&store, Predicate::like("where", "%, usa")), vec![1]);
        assert_eq!(ids(&store, Predicate::blank("where")), vec![3]);
    }

    #[test]
    fn date_parts() {
        let store = store();
        let month = Column::Part("when", DatePart::Month);
        assert_eq!(ids(&store, Predicate::compare(month, Op::Eq, 12)), vec![1]);
    }

    #[test]
    fn exists_through_join_table() {
        let store = store();
        let images = schema::association(RecordType::Observation, "images").unwrap();
        let pred = Predicate::exists(images, Predicate::compare("vote_cache", Op::Gt, 2.0));
        assert_eq!(ids(&store, pred), vec![1]);
        assert_eq!(ids(&store, Predicate::exists(images, Predicate::True)), vec![1, 2]);
    }

    #[test]
    fn regex_is_case_insensitive() {
        let store = store();
        assert_eq!(ids(&store, Predicate::regex("where", "(^|, )(switzerland)$")), vec![2]);
        let err = store
            .ids_where(RecordType::Observation, &Predicate::regex("where", "("))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidRegex(_)));
    }

    #[test]
    fn insert_and_remove() {
        let store = store();
        store.insert(RecordType::Observation, &json!({"id": 4, "where": "Albion, California, USA"})).unwrap();
        assert_eq!(ids(&store, Predicate::like("where", "%california%")), vec![1, 4]);
        assert!(store.remove(RecordType::Observation, 1));
        assert!(!store.remove(RecordType::Observation, 1));
        assert_eq!(ids(&store, Predicate::like("where", "%california%")), vec![4]);
    }

    #[test]
    fn unknown_join_table_is_rejected() {
        assert!(store().link("observation_colours", JoinRow::new()).is_err());
    }
}
