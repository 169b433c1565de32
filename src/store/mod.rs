//! The document-store port.
//!
//! Every component persists through this small query/insert/update/delete
//! interface and never assumes a specific storage engine. Filters are a
//! typed condition tree evaluated against the serialized form of a record,
//! so a store can match documents without knowing their concrete type.
//!
//! The crate ships [`MemoryStore`], a deterministic in-memory
//! implementation used by the CLI and the test suite.

mod memory;

pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AnnoportError;

/// A persistable record type.
///
/// `COLLECTION` names the logical collection the record lives in; `Id` is
/// the newtype handed out by the store when the record is inserted.
pub trait Record: Clone + Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
    type Id: Copy + Eq + Ord + From<u64> + Into<u64> + std::fmt::Debug;
}

/// A record together with its store-assigned identity.
#[derive(Clone, Debug)]
pub struct Stored<R: Record> {
    pub id: R::Id,
    pub record: R,
}

/// A query condition evaluated against a record's serialized fields.
///
/// Field names are the record's serde field names. Equality on a field
/// that the document does not carry never matches, which is exactly what
/// optional category references rely on.
#[derive(Clone, Debug)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Matches documents whose field equals the value.
    Eq(&'static str, serde_json::Value),
    /// Matches documents satisfying every condition.
    And(Vec<Filter>),
    /// Matches documents satisfying at least one condition.
    Or(Vec<Filter>),
}

impl Filter {
    /// Equality condition on a single field.
    pub fn eq(field: &'static str, value: impl Into<serde_json::Value>) -> Self {
        Filter::Eq(field, value.into())
    }

    /// Conjunction of conditions.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    /// Disjunction of conditions.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    /// Evaluates the condition against a serialized document.
    pub fn matches(&self, doc: &serde_json::Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

/// The persistence port consumed by every component.
///
/// All operations are synchronous and block the calling request; reads
/// return records in insertion order so processing is deterministic.
pub trait DocumentStore {
    /// Inserts a record and returns it with its assigned identity.
    fn insert_one<R: Record>(&mut self, record: R) -> Result<Stored<R>, AnnoportError>;

    /// Inserts a batch of records. The operation either inserts every
    /// record or fails as a whole; callers that need per-item isolation
    /// retry with [`insert_one`](DocumentStore::insert_one).
    fn insert_many<R: Record>(&mut self, records: Vec<R>) -> Result<Vec<Stored<R>>, AnnoportError>;

    /// Returns the first record matching the filter, in insertion order.
    fn find_one<R: Record>(&self, filter: &Filter) -> Result<Option<Stored<R>>, AnnoportError>;

    /// Returns all records matching the filter, in insertion order.
    fn find_many<R: Record>(&self, filter: &Filter) -> Result<Vec<Stored<R>>, AnnoportError>;

    /// Applies a mutation to the record with the given identity. Returns
    /// false when no such record exists.
    fn update_one<R: Record>(
        &mut self,
        id: R::Id,
        apply: impl FnOnce(&mut R),
    ) -> Result<bool, AnnoportError>;

    /// Counts records matching the filter.
    fn count_documents<R: Record>(&self, filter: &Filter) -> Result<u64, AnnoportError>;

    /// Deletes all records matching the filter. Returns the number removed.
    fn delete_many<R: Record>(&mut self, filter: &Filter) -> Result<u64, AnnoportError>;
}
