//! Pure query evaluation over collection snapshots.

use crate::types::{Document, DocumentId, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort direction for a query's `order_by` clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A query against one collection: conjunctive equality filters plus an
/// optional sort clause.
///
/// ```
/// use shoebox::{Query, SortDirection};
///
/// let q = Query::collection("tasks")
///     .filter("workspaceId", "w1")
///     .order_by("order", SortDirection::Ascending);
/// assert_eq!(q.collection_name(), "tasks");
/// ```
#[derive(Clone, Debug)]
pub struct Query {
    collection: String,
    filters: Vec<(String, Value)>,
    order_by: Option<(String, SortDirection)>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Query {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    /// Add an equality filter. Filters are conjunctive: a document must match
    /// every one. No other operators are interpreted.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| doc.get(field).is_some_and(|v| v.matches(value)))
    }
}

/// Evaluate a query against a collection snapshot.
///
/// Pure and deterministic: identical inputs always yield identical output.
/// The sort is stable, so documents that tie (or lack the sort field) keep
/// the snapshot's iteration order. Documents missing the sort field order
/// after all documents that have it, in either direction, so legacy data
/// stays visible at the end of the list.
pub fn evaluate(snapshot: &[Document], query: &Query) -> Vec<Document> {
    let mut results: Vec<Document> = snapshot
        .iter()
        .filter(|d| query.matches(d))
        .cloned()
        .collect();

    if let Some((field, direction)) = &query.order_by {
        results.sort_by(|a, b| match (a.get(field), b.get(field)) {
            (Some(va), Some(vb)) => {
                let ord = va.sort_cmp(vb);
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }

    results
}

/// A point-in-time, immutable query result handed to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySnapshot {
    docs: Vec<Document>,
}

impl QuerySnapshot {
    pub(crate) fn new(docs: Vec<Document>) -> Self {
        QuerySnapshot { docs }
    }

    /// Number of matching documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents in query order.
    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.docs.iter()
    }

    /// Document ids in query order.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.docs.iter().map(|d| d.id.clone()).collect()
    }

    pub fn into_docs(self) -> Vec<Document> {
        self.docs
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}
