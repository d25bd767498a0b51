//! The query engine: compile, cache, save and resume.

use std::sync::Arc;

use crate::cache::QueryCache;
use crate::compiler::{Compiler, QuerySpec, BY, ORDER_BY};
use crate::config::EngineConfig;
use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::fingerprint::Fingerprint;
use crate::memory::MemoryStore;
use crate::param::{ParamMap, ParamValue};
use crate::query::Query;
use crate::record::{MemoryRecords, QueryRecord, QueryRecordStore};
use crate::schema::{self, RecordType};
use crate::store::{Directory, Store};

pub struct QueryEngine {
    store: Arc<dyn Store>,
    directory: Arc<dyn Directory>,
    records: Arc<dyn QueryRecordStore>,
    cache: QueryCache,
    config: EngineConfig,
}

impl QueryEngine {
    /// An engine that keeps saved queries in memory.
    pub fn new(store: Arc<dyn Store>, directory: Arc<dyn Directory>, config: EngineConfig) -> Self {
        let cache = QueryCache::new(config.cache_capacity, config.cache_ttl());
        Self {
            store,
            directory,
            records: Arc::new(MemoryRecords::new()),
            cache,
            config,
        }
    }

    /// An engine whose store and directory are the same in-memory dataset.
    pub fn in_memory(data: Arc<MemoryStore>, config: EngineConfig) -> Self {
        Self::new(data.clone(), data, config)
    }

    pub fn with_records(mut self, records: Arc<dyn QueryRecordStore>) -> Self {
        self.records = records;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn records(&self) -> &dyn QueryRecordStore {
        self.records.as_ref()
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(self.directory.as_ref(), &self.config)
    }

    /// A context carrying the configured defaults.
    pub fn context(&self) -> QueryContext {
        QueryContext::new().with_location_format(self.config.location_format)
    }

    /// Compiles a query, returning the cached one when the fingerprint has
    /// been seen.
    pub fn lookup(&self, record_type: RecordType, params: &ParamMap, context: &QueryContext) -> Result<Arc<Query>> {
        let spec = self.compiler().compile(record_type, params, context)?;
        Ok(self.cached(spec))
    }

    fn cached(&self, spec: QuerySpec) -> Arc<Query> {
        let fingerprint = spec.fingerprint.clone();
        self.cache.get_or_insert_with(&fingerprint, || {
            tracing::debug!(%fingerprint, "query cache miss");
            Arc::new(Query::new(spec, self.store.clone()))
        })
    }

    /// Like [`lookup`](Self::lookup), and saves the query so it can be
    /// resumed by fingerprint later.
    pub fn lookup_and_save(
        &self,
        record_type: RecordType,
        params: &ParamMap,
        context: &QueryContext,
    ) -> Result<Arc<Query>> {
        let query = self.lookup(record_type, params, context)?;
        self.records.save(QueryRecord::from_spec(query.spec()))?;
        Ok(query)
    }

    /// Rebuilds a saved query.
    pub fn resume(&self, fingerprint: &Fingerprint) -> Result<Arc<Query>> {
        if let Some(cached) = self.cache.get(fingerprint) {
            self.records.touch(fingerprint)?;
            return Ok(cached);
        }
        let record = self
            .records
            .load(fingerprint)?
            .ok_or_else(|| QueryError::UnknownFingerprint(fingerprint.to_string()))?;

        let context = self.saved_context(&record.context)?;
        let spec = self
            .compiler()
            .compile_normalized(record.record_type, record.params, &context)
            .inspect_err(|err| tracing::warn!(%fingerprint, error = %err, "saved query no longer compiles"))?;
        if spec.fingerprint != *fingerprint {
            tracing::warn!(
                %fingerprint,
                now = %spec.fingerprint,
                "saved query compiles to a different fingerprint"
            );
        }
        self.records.touch(fingerprint)?;
        Ok(self.cached(spec))
    }

    /// Re-targets `query` at a related record type by nesting its params
    /// under the target's subquery key. Ordering params stay behind; the new
    /// query sorts by the target's default.
    pub fn coerce(&self, query: &Query, target: RecordType) -> Result<Arc<Query>> {
        let source = query.record_type();
        let context = self.saved_context(&query.spec().context)?;
        if source == target {
            return self.lookup(target, query.params(), &context);
        }

        let key = schema::associations_of(target)
            .iter()
            .filter(|a| a.target == source)
            .find_map(|a| a.subquery_key)
            .ok_or_else(|| QueryError::UnknownAssociation {
                record_type: target,
                key: format!("{}_query", source.tag()),
            })?;

        let nested: ParamMap = query
            .params()
            .iter()
            .filter(|(k, _)| k.as_str() != BY && k.as_str() != ORDER_BY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut params = ParamMap::new();
        params.insert(key.to_string(), ParamValue::Nested(nested));

        tracing::debug!(%source, %target, key, "coerced query");
        self.lookup(target, &params, &context)
    }

    /// Configured defaults overlaid with the context a compile recorded.
    fn saved_context(&self, saved: &ParamMap) -> Result<QueryContext> {
        let mut context = self.context();
        let parsed = QueryContext::from_params(saved)?;
        context.current_user = parsed.current_user;
        if saved.contains_key("location_format") {
            context.location_format = parsed.location_format;
        }
        Ok(context)
    }

    /// Drops cached queries that read `record_type`. Call after changing
    /// rows of that type.
    pub fn invalidate(&self, record_type: RecordType) -> usize {
        self.cache.invalidate(record_type)
    }

    pub fn invalidate_all(&self) {
        tracing::debug!(dropped = self.cache.len(), "cleared query cache");
        self.cache.clear();
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}
