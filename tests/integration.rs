//! Integration tests for the document store.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use shoebox::{
    front_rank, Document, DocumentId, DocumentRef, Entity, Fields, FileBackend, MemoryBackend,
    Query, SessionStore, SortDirection, StorageBackend, Store, Timestamp, Value,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn open_store() -> Store {
    Store::open(Arc::new(MemoryBackend::new())).unwrap()
}

fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// --- Realistic Workflow Tests ---

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    title: String,
    workspace_id: String,
    order: f64,
    done: bool,
    created_at: Timestamp,
}

impl Entity for Task {
    const COLLECTION: &'static str = "tasks";
}

#[test]
fn test_task_list_workflow() {
    init_tracing();
    let store = open_store();
    let tasks = store.collection::<Task>();

    // Create three tasks in workspace w1 and one elsewhere.
    for (i, title) in ["groceries", "laundry", "taxes"].iter().enumerate() {
        tasks
            .create(&Task {
                title: title.to_string(),
                workspace_id: "w1".into(),
                order: i as f64,
                done: false,
                created_at: Timestamp::now(),
            })
            .unwrap();
    }
    tasks
        .create(&Task {
            title: "other workspace".into(),
            workspace_id: "w2".into(),
            order: 0.0,
            done: false,
            created_at: Timestamp::now(),
        })
        .unwrap();

    let query = tasks
        .query()
        .filter("workspaceId", "w1")
        .order_by("order", SortDirection::Ascending);

    let result = store.query(&query);
    assert_eq!(result.len(), 3);
    let titles: Vec<_> = result
        .iter()
        .map(|d| d.get("title").unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["groceries", "laundry", "taxes"]);

    // Completing a task is visible through the typed view.
    let (id, _) = tasks
        .all()
        .unwrap()
        .into_iter()
        .find(|(_, t)| t.title == "laundry")
        .unwrap();
    #[derive(Serialize)]
    struct DonePatch {
        done: bool,
    }
    tasks.update(&id, &DonePatch { done: true }).unwrap();
    assert!(tasks.get(&id).unwrap().unwrap().done);
}

#[test]
fn test_new_task_gets_front_rank_and_sorts_first() {
    let store = open_store();
    for rank in [5i64, 6, 7] {
        store
            .create_document("tasks", fields(&[("order", rank.into())]))
            .unwrap();
    }

    let rank = front_rank(&store.read("tasks"), "order");
    assert_eq!(rank, 4.0);

    let new_id = store
        .create_document(
            "tasks",
            fields(&[("order", rank.into()), ("title", "newest".into())]),
        )
        .unwrap();

    let query = Query::collection("tasks").order_by("order", SortDirection::Ascending);
    let result = store.query(&query);
    assert_eq!(result.docs()[0].id, new_id);
}

// --- Subscription Properties ---

#[test]
fn test_workspace_filter_never_leaks_across_workspaces() {
    let store = open_store();
    let delivered: Arc<Mutex<Vec<Document>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&delivered);
    store.subscribe(
        Query::collection("tasks").filter("workspaceId", "w1"),
        move |snap| sink.lock().unwrap().extend(snap.into_docs()),
    );

    // Interleave mutations across workspaces.
    let w1 = store
        .create_document("tasks", fields(&[("workspaceId", "w1".into())]))
        .unwrap();
    let w2 = store
        .create_document("tasks", fields(&[("workspaceId", "w2".into())]))
        .unwrap();
    store
        .update_document(
            &DocumentRef::new("tasks", w2.as_str()),
            fields(&[("title", "stays hidden".into())]),
        )
        .unwrap();
    store
        .update_document(
            &DocumentRef::new("tasks", w1.as_str()),
            fields(&[("title", "visible".into())]),
        )
        .unwrap();
    store.delete_document(&DocumentRef::new("tasks", w2.as_str())).unwrap();

    for doc in delivered.lock().unwrap().iter() {
        assert_eq!(doc.get("workspaceId"), Some(&Value::from("w1")));
    }
}

#[test]
fn test_ordered_delivery_has_sorted_adjacent_pairs() {
    let store = open_store();
    let snapshots = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&snapshots);
    store.subscribe(
        Query::collection("tasks").order_by("order", SortDirection::Ascending),
        move |snap| sink.lock().unwrap().push(snap),
    );

    for rank in [3i64, 1, 4, 1, 5, 9, 2, 6] {
        store
            .create_document("tasks", fields(&[("order", rank.into())]))
            .unwrap();
    }

    for snap in snapshots.lock().unwrap().iter() {
        for pair in snap.docs().windows(2) {
            let a = pair[0].get("order").unwrap().as_f64().unwrap();
            let b = pair[1].get("order").unwrap().as_f64().unwrap();
            assert!(a <= b, "unsorted adjacent pair: {a} > {b}");
        }
    }
}

#[test]
fn test_unsubscribe_mid_sequence_stops_only_that_listener() {
    let store = open_store();
    let first = Arc::new(Mutex::new(0));
    let second = Arc::new(Mutex::new(0));

    let f = Arc::clone(&first);
    let handle = store.subscribe(Query::collection("tasks"), move |_| {
        *f.lock().unwrap() += 1
    });
    let s = Arc::clone(&second);
    store.subscribe(Query::collection("tasks"), move |_| {
        *s.lock().unwrap() += 1
    });

    store.create_document("tasks", Fields::new()).unwrap();
    store.unsubscribe(handle);
    store.create_document("tasks", Fields::new()).unwrap();
    store.create_document("tasks", Fields::new()).unwrap();

    assert_eq!(*first.lock().unwrap(), 2); // initial + one create
    assert_eq!(*second.lock().unwrap(), 4); // initial + three creates
}

#[test]
fn test_callbacks_see_fifo_mutation_order() {
    let store = open_store();
    let counts = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&counts);
    store.subscribe(Query::collection("tasks"), move |snap| {
        sink.lock().unwrap().push(snap.len())
    });

    for _ in 0..3 {
        store.create_document("tasks", Fields::new()).unwrap();
    }
    let id = store.read("tasks")[0].id.clone();
    store.delete_document(&DocumentRef::new("tasks", id)).unwrap();

    assert_eq!(*counts.lock().unwrap(), vec![0, 1, 2, 3, 2]);
}

// --- Durability ---

#[test]
fn test_blob_roundtrip_across_collections() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    let mut created = 0;
    {
        let backend = Arc::new(FileBackend::open(&path).unwrap());
        let store = Store::open(backend).unwrap();
        for collection in ["tasks", "notes", "habits", "events"] {
            for i in 0..5i64 {
                store
                    .create_document(
                        collection,
                        fields(&[
                            ("title", format!("{collection} {i}").into()),
                            ("order", i.into()),
                            ("createdAt", Timestamp::new(1_700_000_000 + i, 0).into()),
                        ]),
                    )
                    .unwrap();
                created += 1;
            }
        }
        assert_eq!(store.stats().document_count, created);
    }

    // Fresh store, same backend: structural equality of all collections.
    let backend = Arc::new(FileBackend::open(&path).unwrap());
    let store = Store::open(backend).unwrap();
    let stats = store.stats();
    assert_eq!(stats.collection_count, 4);
    assert_eq!(stats.document_count, created);

    let tasks = store.read("tasks");
    assert_eq!(tasks.len(), 5);
    assert_eq!(
        tasks[0].get("createdAt"),
        Some(&Value::Timestamp(Timestamp::new(1_700_000_000, 0)))
    );
}

#[test]
fn test_session_blob_is_independent_of_documents() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Store::open(Arc::clone(&backend) as Arc<dyn StorageBackend>).unwrap();
    let session = SessionStore::open(Arc::clone(&backend) as Arc<dyn StorageBackend>).unwrap();

    let doc_hits = Arc::new(Mutex::new(0));
    let d = Arc::clone(&doc_hits);
    store.subscribe(Query::collection("tasks"), move |_| {
        *d.lock().unwrap() += 1
    });

    // Auth changes never wake document subscribers, and vice versa.
    session.sign_in("ada@example.com").unwrap();
    session.sign_out().unwrap();
    assert_eq!(*doc_hits.lock().unwrap(), 1); // initial delivery only

    let auth_hits = Arc::new(Mutex::new(0));
    let a = Arc::clone(&auth_hits);
    session.on_change(move |_| *a.lock().unwrap() += 1);
    store.create_document("tasks", Fields::new()).unwrap();
    assert_eq!(*auth_hits.lock().unwrap(), 1); // initial delivery only
}

// --- Properties ---

#[derive(Clone, Debug)]
enum Op {
    Create,
    /// Delete the n-th live document, if any.
    Delete(usize),
    /// Update the n-th live document, if any.
    Update(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Create),
        1 => (0usize..8).prop_map(Op::Delete),
        1 => (0usize..8).prop_map(Op::Update),
    ]
}

proptest! {
    /// Replaying any operation sequence from empty, the final count equals
    /// creates minus deletes of documents that existed at delete time.
    #[test]
    fn prop_replay_count_matches_model(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let store = open_store();
        let mut live: Vec<DocumentId> = Vec::new();
        let mut creates = 0usize;
        let mut effective_deletes = 0usize;

        for op in ops {
            match op {
                Op::Create => {
                    let id = store.create_document("items", Fields::new()).unwrap();
                    live.push(id);
                    creates += 1;
                }
                Op::Delete(n) => {
                    if !live.is_empty() {
                        let id = live.remove(n % live.len());
                        let removed = store
                            .delete_document(&DocumentRef::new("items", id))
                            .unwrap();
                        prop_assert!(removed);
                        effective_deletes += 1;
                    }
                }
                Op::Update(n) => {
                    if !live.is_empty() {
                        let id = live[n % live.len()].clone();
                        store
                            .update_document(
                                &DocumentRef::new("items", id),
                                fields(&[("touched", true.into())]),
                            )
                            .unwrap();
                    }
                }
            }
        }

        prop_assert_eq!(store.read("items").len(), creates - effective_deletes);
    }

    /// The durable blob round-trips arbitrary field bags structurally.
    #[test]
    fn prop_blob_roundtrip_preserves_documents(
        titles in proptest::collection::vec("[a-zA-Z0-9 ]{0,20}", 1..10),
    ) {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = Store::open(Arc::clone(&backend) as Arc<dyn StorageBackend>).unwrap();
            for (i, title) in titles.iter().enumerate() {
                store
                    .create_document(
                        "notes",
                        fields(&[
                            ("title", title.as_str().into()),
                            ("order", (i as i64).into()),
                        ]),
                    )
                    .unwrap();
            }
        }

        let store = Store::open(backend).unwrap();
        let notes = store.read("notes");
        prop_assert_eq!(notes.len(), titles.len());
        for (doc, title) in notes.iter().zip(&titles) {
            prop_assert_eq!(doc.get("title").unwrap().as_str().unwrap(), title.as_str());
        }
    }
}
