//! Collaborators the engine executes against.
//!
//! [`Store`] runs a compiled [`QuerySpec`] and returns ordered ids.
//! [`Directory`] answers the lookups some filters need while compiling:
//! resolving names, logins and titles to ids, and walking the taxonomy.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::compiler::QuerySpec;
use crate::error::Result;
use crate::predicate::Predicate;
use crate::schema::RecordType;
use crate::value::Id;

/// Executes compiled queries.
pub trait Store: Send + Sync {
    /// Ids of the rows matching `spec.predicate`, in `spec.order`, without
    /// duplicates.
    fn execute(&self, spec: &QuerySpec) -> Result<Vec<Id>>;

    /// Number of matching rows.
    fn count(&self, spec: &QuerySpec) -> Result<usize> {
        Ok(self.execute(spec)?.len())
    }
}

/// One name, as far as taxonomy lookups care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxon {
    pub id: Id,
    pub text_name: String,
    pub rank: Option<String>,
    /// Names sharing a synonym id are synonyms of each other.
    pub synonym_id: Option<Id>,
    /// Set on misspellings; points at the correct spelling.
    pub correct_spelling_id: Option<Id>,
}

impl Taxon {
    /// Id of the correctly spelled name this one stands for.
    pub fn canonical_id(&self) -> Id {
        self.correct_spelling_id.unwrap_or(self.id)
    }
}

/// Lookups performed while compiling.
pub trait Directory: Send + Sync {
    /// Ids of `record_type` rows matching `predicate`, in id order.
    fn ids_where(&self, record_type: RecordType, predicate: &Predicate) -> Result<Vec<Id>>;

    /// Names matching `predicate`, in id order.
    fn taxa_where(&self, predicate: &Predicate) -> Result<Vec<Taxon>>;

    /// Id of the placeholder name given to unidentified observations.
    fn unknown_name_id(&self) -> Option<Id>;
}

/// Passes lookups through to a [`Directory`] and notes the record types
/// they read. A compiled query depends on those rows too.
pub(crate) struct DirectoryReads<'a> {
    inner: &'a dyn Directory,
    read: Mutex<BTreeSet<RecordType>>,
}

impl<'a> DirectoryReads<'a> {
    pub(crate) fn new(inner: &'a dyn Directory) -> Self {
        Self {
            inner,
            read: Mutex::new(BTreeSet::new()),
        }
    }

    pub(crate) fn into_types(self) -> BTreeSet<RecordType> {
        self.read.into_inner()
    }
}

impl Directory for DirectoryReads<'_> {
    fn ids_where(&self, record_type: RecordType, predicate: &Predicate) -> Result<Vec<Id>> {
        self.read.lock().insert(record_type);
        self.inner.ids_where(record_type, predicate)
    }

    fn taxa_where(&self, predicate: &Predicate) -> Result<Vec<Taxon>> {
        self.read.lock().insert(RecordType::Name);
        self.inner.taxa_where(predicate)
    }

    fn unknown_name_id(&self) -> Option<Id> {
        self.read.lock().insert(RecordType::Name);
        self.inner.unknown_name_id()
    }
}
