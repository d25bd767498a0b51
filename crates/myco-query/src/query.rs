//! A compiled query bound to the store that answers it.
//!
//! The id list is fetched on first use and kept for the life of the
//! [`Query`]. Navigation (`next`, `prev`, pages) works over that list.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;

use crate::compiler::QuerySpec;
use crate::error::{QueryError, Result};
use crate::fingerprint::Fingerprint;
use crate::param::ParamMap;
use crate::schema::RecordType;
use crate::store::Store;
use crate::value::Id;

/// Where a query is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Compiled, results not fetched yet.
    Compiled,
    /// Results fetched and held.
    Executed,
}

pub struct Query {
    spec: QuerySpec,
    store: Arc<dyn Store>,
    ids: OnceCell<Vec<Id>>,
    positions: OnceCell<HashMap<Id, usize>>,
    created: Instant,
}

impl Query {
    pub fn new(spec: QuerySpec, store: Arc<dyn Store>) -> Self {
        Self {
            spec,
            store,
            ids: OnceCell::new(),
            positions: OnceCell::new(),
            created: Instant::now(),
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn record_type(&self) -> RecordType {
        self.spec.record_type
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.spec.fingerprint
    }

    /// Normalized parameters.
    pub fn params(&self) -> &ParamMap {
        &self.spec.params
    }

    pub fn state(&self) -> QueryState {
        match self.ids.get() {
            Some(_) => QueryState::Executed,
            None => QueryState::Compiled,
        }
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Matching ids in order. Fetched once.
    pub fn result_ids(&self) -> Result<&[Id]> {
        let ids = self.ids.get_or_try_init(|| {
            let ids = self.store.execute(&self.spec)?;
            tracing::debug!(fingerprint = %self.spec.fingerprint, results = ids.len(), "fetched results");
            Ok::<_, QueryError>(ids)
        })?;
        Ok(ids)
    }

    /// Number of matches. Uses the fetched list when there is one.
    pub fn count(&self) -> Result<usize> {
        match self.ids.get() {
            Some(ids) => Ok(ids.len()),
            None => self.store.count(&self.spec),
        }
    }

    /// Zero-based position of `id`, if it is a result.
    pub fn index_of(&self, id: Id) -> Result<Option<usize>> {
        let ids = self.result_ids()?;
        let positions = self
            .positions
            .get_or_init(|| ids.iter().enumerate().map(|(i, id)| (*id, i)).collect());
        Ok(positions.get(&id).copied())
    }

    /// `id` itself if it is a result.
    pub fn current(&self, id: Id) -> Result<Option<Id>> {
        Ok(self.index_of(id)?.map(|_| id))
    }

    /// The result after `id`. `None` at the end or if `id` is not a result.
    pub fn next(&self, id: Id) -> Result<Option<Id>> {
        let Some(i) = self.index_of(id)? else {
            return Ok(None);
        };
        Ok(self.result_ids()?.get(i + 1).copied())
    }

    /// The result before `id`. `None` at the start or if `id` is not a result.
    pub fn prev(&self, id: Id) -> Result<Option<Id>> {
        let Some(i) = self.index_of(id)? else {
            return Ok(None);
        };
        match i.checked_sub(1) {
            Some(before) => Ok(self.result_ids()?.get(before).copied()),
            None => Ok(None),
        }
    }

    pub fn first_id(&self) -> Result<Option<Id>> {
        Ok(self.result_ids()?.first().copied())
    }

    pub fn last_id(&self) -> Result<Option<Id>> {
        Ok(self.result_ids()?.last().copied())
    }

    /// One page of results. Pages are numbered from 1; page 0, an empty
    /// page size, or a page past the end is empty.
    pub fn paginate(&self, page: usize, per_page: usize) -> Result<&[Id]> {
        let ids = self.result_ids()?;
        if page == 0 || per_page == 0 {
            return Ok(&[]);
        }
        let start = (page - 1).saturating_mul(per_page).min(ids.len());
        let end = start.saturating_add(per_page).min(ids.len());
        Ok(&ids[start..end])
    }

    pub fn num_pages(&self, per_page: usize) -> Result<usize> {
        if per_page == 0 {
            return Ok(0);
        }
        Ok(self.count()?.div_ceil(per_page))
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("record_type", &self.spec.record_type)
            .field("fingerprint", &self.spec.fingerprint)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.spec, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::QueryBuilder;
    use crate::ordering::{Dir, SortTerm};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        ids: Vec<Id>,
        calls: AtomicUsize,
    }

    impl Store for Fixed {
        fn execute(&self, _: &QuerySpec) -> Result<Vec<Id>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ids.clone())
        }
    }

    fn query(ids: Vec<Id>) -> (Query, Arc<Fixed>) {
        let store = Arc::new(Fixed {
            ids,
            calls: AtomicUsize::new(0),
        });
        let spec = QueryBuilder::new(RecordType::Observation).finish(
            ParamMap::new(),
            ParamMap::new(),
            vec![SortTerm::primary_key(Dir::Asc)],
        );
        (Query::new(spec, store.clone()), store)
    }

    #[test]
    fn results_are_fetched_once() {
        let (query, store) = query(vec![3, 1, 2]);
        assert_eq!(query.state(), QueryState::Compiled);
        assert_eq!(query.result_ids().unwrap(), &[3, 1, 2]);
        assert_eq!(query.result_ids().unwrap(), &[3, 1, 2]);
        assert_eq!(query.count().unwrap(), 3);
        assert_eq!(query.state(), QueryState::Executed);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn navigation_has_no_wraparound() {
        let (query, _) = query(vec![3, 1, 2]);
        assert_eq!(query.next(3).unwrap(), Some(1));
        assert_eq!(query.next(2).unwrap(), None);
        assert_eq!(query.prev(1).unwrap(), Some(3));
        assert_eq!(query.prev(3).unwrap(), None);
        assert_eq!(query.current(9).unwrap(), None);
        assert_eq!(query.next(9).unwrap(), None);
        assert_eq!(query.index_of(2).unwrap(), Some(2));
        assert_eq!(query.first_id().unwrap(), Some(3));
        assert_eq!(query.last_id().unwrap(), Some(2));
    }

    #[test]
    fn pages() {
        let (query, _) = query((1..=7).collect());
        assert_eq!(query.paginate(1, 3).unwrap(), &[1, 2, 3]);
        assert_eq!(query.paginate(3, 3).unwrap(), &[7]);
        assert!(query.paginate(4, 3).unwrap().is_empty());
        assert!(query.paginate(0, 3).unwrap().is_empty());
        assert_eq!(query.num_pages(3).unwrap(), 3);
        assert_eq!(query.num_pages(0).unwrap(), 0);
    }

    #[test]
    fn empty_results() {
        let (query, _) = query(Vec::new());
        assert_eq!(query.first_id().unwrap(), None);
        assert_eq!(query.num_pages(10).unwrap(), 0);
    }
}
