//! Typed record shapes at the mutation boundary.
//!
//! The store itself is schema-free; [`TypedCollection`] gives callers static
//! field checking for a collection by round-tripping records through serde.

use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::store::Store;
use crate::types::{Document, DocumentId, DocumentRef, Fields};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// A record shape bound to one collection.
pub trait Entity: Serialize + DeserializeOwned {
    /// Collection this record type lives in.
    const COLLECTION: &'static str;
}

/// Typed view over one collection of a [`Store`].
pub struct TypedCollection<'a, T: Entity> {
    store: &'a Store,
    _marker: PhantomData<T>,
}

impl<'a, T: Entity> TypedCollection<'a, T> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Create a document from a typed record.
    pub fn create(&self, record: &T) -> Result<DocumentId> {
        self.store.create_document(T::COLLECTION, to_fields(record)?)
    }

    /// Fetch one record by id.
    pub fn get(&self, id: &DocumentId) -> Result<Option<T>> {
        self.store
            .read(T::COLLECTION)
            .iter()
            .find(|d| &d.id == id)
            .map(from_document)
            .transpose()
    }

    /// All records in the collection, paired with their ids.
    pub fn all(&self) -> Result<Vec<(DocumentId, T)>> {
        self.store
            .read(T::COLLECTION)
            .iter()
            .map(|d| Ok((d.id.clone(), from_document(d)?)))
            .collect()
    }

    /// Shallow-merge a typed patch into an existing record.
    pub fn update(&self, id: &DocumentId, patch: &impl Serialize) -> Result<()> {
        self.store.update_document(
            &DocumentRef::new(T::COLLECTION, id.clone()),
            to_fields(patch)?,
        )
    }

    /// Delete by id; reports whether a record was removed.
    pub fn delete(&self, id: &DocumentId) -> Result<bool> {
        self.store
            .delete_document(&DocumentRef::new(T::COLLECTION, id.clone()))
    }

    /// Query builder scoped to this collection.
    pub fn query(&self) -> Query {
        Query::collection(T::COLLECTION)
    }
}

/// Serialize a record into the open field bag. The record must serialize to
/// an object.
pub fn to_fields(record: &impl Serialize) -> Result<Fields> {
    let json = serde_json::to_value(record)?;
    let serde_json::Value::Object(map) = json else {
        return Err(StoreError::Serialization(
            "record must serialize to an object".to_string(),
        ));
    };
    map.into_iter()
        .map(|(k, v)| Ok((k, serde_json::from_value(v)?)))
        .collect()
}

/// Rebuild a typed record from a document's fields.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    let json = serde_json::to_value(&doc.fields)?;
    serde_json::from_value(json).map_err(|e| StoreError::Deserialization(e.to_string()))
}
