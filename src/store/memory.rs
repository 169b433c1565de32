//! In-memory document store.

use std::collections::BTreeMap;

use super::{DocumentStore, Filter, Record, Stored};
use crate::error::AnnoportError;

/// A document store backed by in-memory maps.
///
/// Collections are keyed by name; documents by a single monotonically
/// increasing identity sequence shared across collections, so an id never
/// repeats within one store. Iteration follows insertion order, which
/// keeps imports and exports deterministic in tests and in the CLI.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: BTreeMap<&'static str, BTreeMap<u64, serde_json::Value>>,
    next_id: u64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            collections: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn serialize<R: Record>(record: &R) -> Result<serde_json::Value, AnnoportError> {
        serde_json::to_value(record).map_err(|err| AnnoportError::Store {
            message: format!("failed to serialize {} document: {err}", R::COLLECTION),
        })
    }

    fn deserialize<R: Record>(doc: &serde_json::Value) -> Result<R, AnnoportError> {
        serde_json::from_value(doc.clone()).map_err(|err| AnnoportError::Store {
            message: format!("failed to deserialize {} document: {err}", R::COLLECTION),
        })
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one<R: Record>(&mut self, record: R) -> Result<Stored<R>, AnnoportError> {
        let doc = Self::serialize(&record)?;
        let id = self.next_id;
        self.next_id += 1;
        self.collections
            .entry(R::COLLECTION)
            .or_default()
            .insert(id, doc);
        Ok(Stored {
            id: R::Id::from(id),
            record,
        })
    }

    fn insert_many<R: Record>(&mut self, records: Vec<R>) -> Result<Vec<Stored<R>>, AnnoportError> {
        // Serialize everything up front so a bad record fails the bulk
        // insert before anything is written.
        let docs = records
            .iter()
            .map(Self::serialize)
            .collect::<Result<Vec<_>, _>>()?;

        let collection = self.collections.entry(R::COLLECTION).or_default();
        let mut stored = Vec::with_capacity(records.len());
        for (record, doc) in records.into_iter().zip(docs) {
            let id = self.next_id;
            self.next_id += 1;
            collection.insert(id, doc);
            stored.push(Stored {
                id: R::Id::from(id),
                record,
            });
        }
        Ok(stored)
    }

    fn find_one<R: Record>(&self, filter: &Filter) -> Result<Option<Stored<R>>, AnnoportError> {
        let Some(collection) = self.collections.get(R::COLLECTION) else {
            return Ok(None);
        };
        for (id, doc) in collection {
            if filter.matches(doc) {
                return Ok(Some(Stored {
                    id: R::Id::from(*id),
                    record: Self::deserialize(doc)?,
                }));
            }
        }
        Ok(None)
    }

    fn find_many<R: Record>(&self, filter: &Filter) -> Result<Vec<Stored<R>>, AnnoportError> {
        let Some(collection) = self.collections.get(R::COLLECTION) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for (id, doc) in collection {
            if filter.matches(doc) {
                found.push(Stored {
                    id: R::Id::from(*id),
                    record: Self::deserialize(doc)?,
                });
            }
        }
        Ok(found)
    }

    fn update_one<R: Record>(
        &mut self,
        id: R::Id,
        apply: impl FnOnce(&mut R),
    ) -> Result<bool, AnnoportError> {
        let key: u64 = id.into();
        let Some(doc) = self
            .collections
            .get_mut(R::COLLECTION)
            .and_then(|collection| collection.get_mut(&key))
        else {
            return Ok(false);
        };
        let mut record: R = Self::deserialize(doc)?;
        apply(&mut record);
        *doc = Self::serialize(&record)?;
        Ok(true)
    }

    fn count_documents<R: Record>(&self, filter: &Filter) -> Result<u64, AnnoportError> {
        let Some(collection) = self.collections.get(R::COLLECTION) else {
            return Ok(0);
        };
        Ok(collection.values().filter(|doc| filter.matches(doc)).count() as u64)
    }

    fn delete_many<R: Record>(&mut self, filter: &Filter) -> Result<u64, AnnoportError> {
        let Some(collection) = self.collections.get_mut(R::COLLECTION) else {
            return Ok(0);
        };
        let before = collection.len();
        collection.retain(|_, doc| !filter.matches(doc));
        Ok((before - collection.len()) as u64)
    }
}
