//! Turning `(record type, params)` into a [`QuerySpec`].
//!
//! Compilation runs in two passes. [`Compiler::normalize`] validates every
//! key and coerces every value into its filter's canonical shape; the
//! fingerprint is taken over that normalized map. [`Compiler::compile`] then
//! walks the keys in sorted order, building one predicate per filter and one
//! existence join per subquery, and resolves the order.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::EngineConfig;
use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::filters::{FilterCatalog, FilterCx};
use crate::fingerprint::Fingerprint;
use crate::ordering::{parse_by, OrderKey, OrderingResolver, SortSource, SortTerm};
use crate::param::{ParamMap, ParamValue};
use crate::predicate::Predicate;
use crate::schema::{self, RecordType};
use crate::store::{Directory, DirectoryReads};
use crate::subquery;
use crate::value::Id;

/// Symbolic order key parameter.
pub const BY: &str = "by";
/// Explicit column order parameter.
pub const ORDER_BY: &str = "order_by";

const SUBQUERY_SUFFIX: &str = "_query";

/// A compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub record_type: RecordType,
    /// Normalized parameters.
    pub params: ParamMap,
    /// The context values the compile read.
    pub context: ParamMap,
    pub predicate: Predicate,
    pub order: Vec<SortTerm>,
    /// Rows must be deduplicated after joining.
    pub distinct: bool,
    pub fingerprint: Fingerprint,
    /// Record types the compiler read through the directory, e.g. names
    /// resolved into the predicate's id sets.
    pub lookups: BTreeSet<RecordType>,
}

impl QuerySpec {
    /// Record types whose rows can change the result or its order.
    pub fn touched_types(&self) -> BTreeSet<RecordType> {
        let mut types = self.predicate.touched_types(self.record_type);
        types.extend(self.lookups.iter().copied());
        for term in &self.order {
            let SortSource::Field { path, .. } = &term.source else {
                continue;
            };
            let mut at = self.record_type;
            for step in path.iter() {
                match schema::association(at, step) {
                    Some(association) => {
                        at = association.target;
                        types.insert(at);
                    }
                    None => break,
                }
            }
        }
        types
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write!(f, "{}.id FROM {} WHERE {}", self.record_type.table(), self.record_type.table(), self.predicate)?;
        write!(f, " ORDER BY ")?;
        for (i, term) in self.order.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

/// Accumulates the predicates of one query level.
///
/// Filters and joins are ANDed in the order they are added. Only
/// [`finish`](Self::finish) produces a [`QuerySpec`].
#[derive(Debug)]
pub struct QueryBuilder {
    record_type: RecordType,
    parts: Vec<Predicate>,
    joined: bool,
    lookups: BTreeSet<RecordType>,
}

impl QueryBuilder {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            parts: Vec::new(),
            joined: false,
            lookups: BTreeSet::new(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn filter(&mut self, predicate: Predicate) -> &mut Self {
        self.parts.push(predicate);
        self
    }

    /// Adds a subquery's existence join.
    pub fn join(&mut self, predicate: Predicate) -> &mut Self {
        self.joined = true;
        self.parts.push(predicate);
        self
    }

    /// Notes record types whose rows went into the predicate without
    /// appearing in it.
    pub fn looked_up(&mut self, types: impl IntoIterator<Item = RecordType>) -> &mut Self {
        self.lookups.extend(types);
        self
    }

    fn into_predicate(self) -> Predicate {
        Predicate::and(self.parts)
    }

    pub fn finish(mut self, params: ParamMap, context: ParamMap, order: Vec<SortTerm>) -> QuerySpec {
        let record_type = self.record_type;
        let joined = self.joined;
        let lookups = std::mem::take(&mut self.lookups);
        let predicate = self.into_predicate();
        let distinct = joined || predicate.has_exists();
        let fingerprint = Fingerprint::of(record_type, &params, &context);
        QuerySpec {
            record_type,
            params,
            context,
            predicate,
            order,
            distinct,
            fingerprint,
            lookups,
        }
    }
}

/// Stateless compiler over a directory and a config.
#[derive(Clone, Copy)]
pub struct Compiler<'a> {
    pub directory: &'a dyn Directory,
    pub config: &'a EngineConfig,
}

impl<'a> Compiler<'a> {
    pub fn new(directory: &'a dyn Directory, config: &'a EngineConfig) -> Self {
        Self { directory, config }
    }

    /// Validates keys and coerces values. Blank strings are dropped.
    pub fn normalize(&self, record_type: RecordType, params: &ParamMap) -> Result<ParamMap> {
        self.normalize_level(record_type, params, true)
    }

    fn normalize_level(&self, record_type: RecordType, params: &ParamMap, top: bool) -> Result<ParamMap> {
        let catalog = FilterCatalog::global();
        let mut out = ParamMap::new();

        for (key, value) in params {
            if value.is_blank() {
                continue;
            }
            let normalized = match key.as_str() {
                BY if top => {
                    let by = value
                        .as_str()
                        .ok_or_else(|| QueryError::shape(BY, "an order key", value))?
                        .trim();
                    parse_by(record_type, by)?;
                    ParamValue::Text(by.to_string())
                }
                ORDER_BY if top => {
                    let columns = match value {
                        ParamValue::List(items) => items.clone(),
                        other => vec![other.clone()],
                    };
                    for column in &columns {
                        let name = column
                            .as_str()
                            .ok_or_else(|| QueryError::shape(ORDER_BY, "column names", column))?;
                        if schema::column(record_type, name.trim_start_matches('-')).is_none() {
                            return Err(QueryError::UnknownOrder {
                                record_type,
                                key: name.to_string(),
                            });
                        }
                    }
                    ParamValue::List(columns)
                }
                k if k.ends_with(SUBQUERY_SUFFIX) => {
                    let association =
                        schema::association_for_subquery(record_type, k).ok_or_else(|| {
                            QueryError::UnknownAssociation {
                                record_type,
                                key: k.to_string(),
                            }
                        })?;
                    let nested = value
                        .as_map()
                        .ok_or_else(|| QueryError::shape(k, "a map of parameters", value))?;
                    ParamValue::Nested(self.normalize_level(association.target, nested, false)?)
                }
                k => {
                    let spec = catalog.lookup(record_type, k)?;
                    spec.shape.normalize(k, value, self.config.max_id_set)?
                }
            };
            out.insert(key.clone(), normalized);
        }
        Ok(out)
    }

    /// Compiles a query for `context`.
    pub fn compile(&self, record_type: RecordType, params: &ParamMap, context: &QueryContext) -> Result<QuerySpec> {
        let normalized = self.normalize(record_type, params)?;
        self.compile_normalized(record_type, normalized, context)
    }

    /// Compiles parameters that already went through [`normalize`](Self::normalize).
    pub fn compile_normalized(
        &self,
        record_type: RecordType,
        params: ParamMap,
        context: &QueryContext,
    ) -> Result<QuerySpec> {
        let reads = DirectoryReads::new(self.directory);
        let cx = FilterCx::new(&reads, context, self.config);
        let mut builder = QueryBuilder::new(record_type);
        self.apply_level(&cx, &mut builder, &params)?;

        let order = self.order(&cx, record_type, &params)?;
        let used = context.restricted(cx.used());
        builder.looked_up(reads.into_types());
        let spec = builder.finish(params, used, order);

        tracing::debug!(
            %record_type,
            fingerprint = %spec.fingerprint,
            distinct = spec.distinct,
            "compiled query"
        );
        Ok(spec)
    }

    /// Predicate for one normalized level, including its subqueries.
    pub(crate) fn predicate(&self, cx: &FilterCx<'_>, record_type: RecordType, params: &ParamMap) -> Result<Predicate> {
        let mut builder = QueryBuilder::new(record_type);
        self.apply_level(cx, &mut builder, params)?;
        Ok(builder.into_predicate())
    }

    fn apply_level(&self, cx: &FilterCx<'_>, builder: &mut QueryBuilder, params: &ParamMap) -> Result<()> {
        let record_type = builder.record_type();
        let catalog = FilterCatalog::global();

        for (key, value) in params {
            match key.as_str() {
                BY | ORDER_BY => {}
                k if k.ends_with(SUBQUERY_SUFFIX) => {
                    let nested = value
                        .as_map()
                        .ok_or_else(|| QueryError::shape(k, "a map of parameters", value))?;
                    builder.join(subquery::merge(self, cx, record_type, k, nested)?);
                }
                k => {
                    let spec = catalog.lookup(record_type, k)?;
                    let predicate = spec.build(cx, record_type, value)?;
                    tracing::trace!(filter = k, %record_type, %predicate, "applied filter");
                    builder.filter(predicate);
                }
            }
        }

        for predicate in implicit_defaults(record_type, params) {
            builder.filter(predicate);
        }
        Ok(())
    }

    fn order(&self, cx: &FilterCx<'_>, record_type: RecordType, params: &ParamMap) -> Result<Vec<SortTerm>> {
        let by = params.get(BY).and_then(ParamValue::as_str);
        let order_by: Option<Vec<String>> = params.get(ORDER_BY).and_then(ParamValue::as_list).map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        });
        let id_order: Option<Vec<Id>> = params
            .get("id_in_set")
            .and_then(ParamValue::as_list)
            .map(|items| items.iter().filter_map(ParamValue::as_int).collect());

        let key: Option<OrderKey> = match (by, &order_by, &id_order) {
            (Some(by), _, _) => Some(parse_by(record_type, by)?.0),
            (None, None, None) => Some(schema::default_order(record_type)),
            _ => None,
        };
        if key.is_some_and(|key| key.uses_location_format(record_type)) {
            cx.mark_location_format();
        }

        let resolver = OrderingResolver {
            context: cx.context,
            accent_folding: self.config.accent_folding,
        };
        resolver.resolve(record_type, by, order_by.as_deref(), id_order.as_deref())
    }
}

/// Filters a record type gets unless the caller says otherwise.
///
/// Names hide misspellings unless `misspellings` is given, or the caller
/// asked for specific ids.
fn implicit_defaults(record_type: RecordType, params: &ParamMap) -> Vec<Predicate> {
    match record_type {
        RecordType::Name if !params.contains_key("misspellings") && !params.contains_key("id_in_set") => {
            vec![Predicate::is_null("correct_spelling_id")]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use crate::store::Taxon;

    struct NoDirectory;

    impl Directory for NoDirectory {
        fn ids_where(&self, _: RecordType, _: &Predicate) -> Result<Vec<Id>> {
            Ok(Vec::new())
        }

        fn taxa_where(&self, _: &Predicate) -> Result<Vec<Taxon>> {
            Ok(Vec::new())
        }

        fn unknown_name_id(&self) -> Option<Id> {
            None
        }
    }

    fn compile(record_type: RecordType, params: ParamMap) -> Result<QuerySpec> {
        let config = EngineConfig::default();
        Compiler::new(&NoDirectory, &config).compile(record_type, &params, &QueryContext::new())
    }

    // =========================================================================
    // Normalization
    // =========================================================================

    #[test]
    fn equivalent_spellings_share_a_fingerprint() {
        let a = compile(RecordType::Observation, params! { "has_images" => "yes", "id_in_set" => 5 }).unwrap();
        let b = compile(RecordType::Observation, params! { "has_images" => true, "id_in_set" => vec![5] }).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.params, b.params);
    }

    #[test]
    fn blank_strings_are_dropped() {
        let spec = compile(RecordType::Observation, params! { "pattern" => "  " }).unwrap();
        assert!(spec.params.is_empty());
        assert_eq!(spec.predicate, Predicate::True);
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(
            compile(RecordType::Observation, params! { "colour" => "red" }),
            Err(QueryError::UnknownFilter { .. })
        ));
        assert!(matches!(
            compile(RecordType::Comment, params! { "region" => "USA" }),
            Err(QueryError::NotApplicable { .. })
        ));
        assert!(matches!(
            compile(RecordType::Observation, params! { "has_images" => "maybe" }),
            Err(QueryError::InvalidShape { .. })
        ));
        assert!(matches!(
            compile(RecordType::Observation, params! { "herbarium_query" => params! {} }),
            Err(QueryError::UnknownAssociation { .. })
        ));
        assert!(matches!(
            compile(RecordType::Observation, params! { "by" => "colour" }),
            Err(QueryError::UnknownOrder { .. })
        ));
        assert!(matches!(
            compile(RecordType::Observation, params! { "order_by" => "-colour" }),
            Err(QueryError::UnknownOrder { .. })
        ));
    }

    #[test]
    fn order_keys_only_at_top_level() {
        let err = compile(
            RecordType::Location,
            params! { "observation_query" => params! { "by" => "date" } },
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::UnknownFilter { .. }));
    }

    // =========================================================================
    // Compilation
    // =========================================================================

    #[test]
    fn empty_id_set_is_false() {
        for rt in RecordType::ALL {
            let spec = compile(rt, params! { "id_in_set" => Vec::<i64>::new() }).unwrap();
            assert_eq!(spec.predicate, Predicate::False, "{rt}");
        }
    }

    #[test]
    fn id_set_orders_by_position() {
        let spec = compile(RecordType::Observation, params! { "id_in_set" => vec![3, 1, 2] }).unwrap();
        assert_eq!(spec.order[0].to_string(), "POSITION(id IN [3, 1, 2]) ASC");
    }

    #[test]
    fn names_hide_misspellings_by_default() {
        let spec = compile(RecordType::Name, ParamMap::new()).unwrap();
        assert_eq!(spec.predicate, Predicate::is_null("correct_spelling_id"));

        let spec = compile(RecordType::Name, params! { "misspellings" => "either" }).unwrap();
        assert_eq!(spec.predicate, Predicate::True);

        let spec = compile(RecordType::Name, params! { "id_in_set" => vec![1] }).unwrap();
        assert_eq!(spec.predicate, Predicate::in_set("id", [1]));
    }

    #[test]
    fn subqueries_join_and_force_distinct() {
        let spec = compile(
            RecordType::Location,
            params! { "observation_query" => params! { "has_specimen" => true } },
        )
        .unwrap();
        assert!(spec.distinct);
        assert_eq!(
            spec.predicate.to_string(),
            "EXISTS(observations WHERE specimen = TRUE)"
        );
    }

    #[test]
    fn fully_hoisted_subquery_keeps_its_join() {
        let spec = compile(
            RecordType::Location,
            params! { "observation_query" => params! { "region" => "California, USA" } },
        )
        .unwrap();
        assert!(spec.distinct);
        let text = spec.predicate.to_string();
        assert!(text.contains("name LIKE '%, California, USA'"), "{text}");
        assert!(text.contains("EXISTS(observations WHERE TRUE)"), "{text}");
    }

    #[test]
    fn every_order_ends_with_primary_key() {
        for rt in RecordType::ALL {
            let spec = compile(rt, ParamMap::new()).unwrap();
            let last = spec.order.last().unwrap();
            assert_eq!(last.source, crate::ordering::SortSource::column("id"), "{rt}");
        }
    }

    #[test]
    fn context_enters_fingerprint_only_when_read() {
        let config = EngineConfig::default();
        let compiler = Compiler::new(&NoDirectory, &config);
        let alice = QueryContext::new().with_user(1);
        let bob = QueryContext::new().with_user(2);

        let plain = params! { "has_images" => true };
        assert_eq!(
            compiler.compile(RecordType::Observation, &plain, &alice).unwrap().fingerprint,
            compiler.compile(RecordType::Observation, &plain, &bob).unwrap().fingerprint
        );

        let personal = params! { "needs_naming" => true };
        let a = compiler.compile(RecordType::Observation, &personal, &alice).unwrap();
        let b = compiler.compile(RecordType::Observation, &personal, &bob).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_eq!(a.context["current_user"], ParamValue::Int(1));
    }

    #[test]
    fn directory_lookups_are_dependencies() {
        let spec = compile(RecordType::Observation, params! { "by_users" => vec!["rolf"] }).unwrap();
        assert_eq!(spec.predicate, Predicate::False);
        assert_eq!(spec.lookups, BTreeSet::from([RecordType::User]));
        assert!(spec.touched_types().contains(&RecordType::User));

        let spec = compile(RecordType::Observation, params! { "names" => params! { "lookup" => 4 } }).unwrap();
        assert!(spec.touched_types().contains(&RecordType::Name));

        let spec = compile(RecordType::Observation, params! { "by_users" => vec![1] }).unwrap();
        assert!(spec.lookups.is_empty());
    }

    #[test]
    fn location_orders_read_location_format() {
        let spec = compile(RecordType::Location, ParamMap::new()).unwrap();
        assert!(spec.context.contains_key("location_format"));

        let spec = compile(RecordType::Observation, ParamMap::new()).unwrap();
        assert!(spec.context.is_empty());
    }
}
