//! In-memory collection set and its durable blob form.

use crate::error::Result;
use crate::types::{Document, DocumentId, Fields};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every known collection, keyed by name. The single source of truth for
/// document data; serializes to one JSON blob of the form
/// `{ collectionName: [Document, ...], ... }`.
///
/// Documents keep insertion order within their collection, which is the tie
/// order query sorts preserve.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSet {
    #[serde(flatten)]
    collections: BTreeMap<String, Vec<Document>>,
}

impl CollectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot copy of a collection. Unknown collections are empty, not an
    /// error.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections.get(collection).cloned().unwrap_or_default()
    }

    pub fn contains(&self, collection: &str, id: &DocumentId) -> bool {
        self.collections
            .get(collection)
            .is_some_and(|docs| docs.iter().any(|d| &d.id == id))
    }

    /// Add a document, creating the collection on first use. The caller
    /// guarantees id uniqueness (ids are store-generated).
    pub fn insert(&mut self, collection: &str, document: Document) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Shallow-merge `patch` into an existing document. Returns false if the
    /// document does not exist.
    pub fn merge(&mut self, collection: &str, id: &DocumentId, patch: &Fields) -> bool {
        let Some(docs) = self.collections.get_mut(collection) else {
            return false;
        };
        let Some(doc) = docs.iter_mut().find(|d| &d.id == id) else {
            return false;
        };
        for (field, value) in patch {
            doc.fields.insert(field.clone(), value.clone());
        }
        true
    }

    /// Remove a document. Returns false if it was already absent.
    pub fn remove(&mut self, collection: &str, id: &DocumentId) -> bool {
        let Some(docs) = self.collections.get_mut(collection) else {
            return false;
        };
        let before = docs.len();
        docs.retain(|d| &d.id != id);
        docs.len() != before
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn document_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Serialize to the durable blob.
    pub fn to_blob(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a durable blob. Errors are the caller's chance to fail closed.
    pub fn from_blob(blob: &str) -> Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn doc(id: &str, title: &str) -> Document {
        let mut fields = Fields::new();
        fields.insert("title".into(), Value::from(title));
        Document::new(DocumentId::new(id), fields)
    }

    #[test]
    fn test_unknown_collection_is_empty() {
        let set = CollectionSet::new();
        assert!(set.snapshot("tasks").is_empty());
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut set = CollectionSet::new();
        set.insert("tasks", doc("1", "a"));
        set.insert("tasks", doc("2", "b"));

        let ids: Vec<_> = set.snapshot("tasks").into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![DocumentId::new("1"), DocumentId::new("2")]);
    }

    #[test]
    fn test_merge_is_shallow_and_keeps_other_fields() {
        let mut set = CollectionSet::new();
        set.insert("tasks", doc("1", "a"));

        let mut patch = Fields::new();
        patch.insert("done".into(), Value::Bool(true));
        assert!(set.merge("tasks", &DocumentId::new("1"), &patch));

        let snapshot = set.snapshot("tasks");
        assert_eq!(snapshot[0].get("title"), Some(&Value::from("a")));
        assert_eq!(snapshot[0].get("done"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_merge_and_remove_missing() {
        let mut set = CollectionSet::new();
        set.insert("tasks", doc("1", "a"));

        assert!(set.contains("tasks", &DocumentId::new("1")));
        assert!(!set.contains("tasks", &DocumentId::new("nope")));
        assert!(!set.merge("tasks", &DocumentId::new("nope"), &Fields::new()));
        assert!(!set.merge("notes", &DocumentId::new("1"), &Fields::new()));
        assert!(!set.remove("tasks", &DocumentId::new("nope")));
        assert!(set.remove("tasks", &DocumentId::new("1")));
        assert!(!set.remove("tasks", &DocumentId::new("1")));
    }

    #[test]
    fn test_blob_roundtrip() {
        let mut set = CollectionSet::new();
        set.insert("tasks", doc("1", "a"));
        set.insert("notes", doc("2", "b"));

        let blob = set.to_blob().unwrap();
        let back = CollectionSet::from_blob(&blob).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_blob_layout_is_collection_to_document_list() {
        let mut set = CollectionSet::new();
        set.insert("tasks", doc("1", "a"));

        let json: serde_json::Value =
            serde_json::from_str(&set.to_blob().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tasks": [{"id": "1", "title": "a"}]})
        );
    }
}
