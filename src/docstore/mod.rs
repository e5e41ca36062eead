//! Document store seam.
//!
//! Stores are passed in by the caller; nothing here opens a connection on
//! its own.

pub mod query;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;

pub use query::{QuerySpec, SortDirection};

pub trait DocumentStore {
    /// Appends `docs` to `collection`, returning how many were stored.
    fn insert_many(&mut self, collection: &str, docs: Vec<Value>) -> Result<usize>;

    fn find(&self, collection: &str, query: &QuerySpec) -> Result<Vec<Value>>;
}

/// In-process store keyed by collection name.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    collections: BTreeMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }
}

impl DocumentStore for MemoryStore {
    fn insert_many(&mut self, collection: &str, docs: Vec<Value>) -> Result<usize> {
        let count = docs.len();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        Ok(count)
    }

    fn find(&self, collection: &str, query: &QuerySpec) -> Result<Vec<Value>> {
        match self.collections.get(collection) {
            Some(docs) => query.apply(docs),
            None => {
                query.validate()?;
                Ok(Vec::new())
            }
        }
    }
}
