//! End-to-end conflict-engine scenarios (S1-S5) driven entirely through the
//! public API, against the in-process reference store.

use revsync::conflict::{ConflictEngine, HighestGenerationWins, Resolver};
use revsync::revision::{DocId, RevId, RevisionView};
use revsync::store::{MemoryStore, NewRevision, RevisionStore};
use serde_json::{Map, Value};

fn body(key: &str, value: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(key.to_string(), Value::String(value.to_string()));
    m
}

/// `1-a -> 2-a -> 3-a`, with sibling branches `1-a -> 2-b` and a deleted
/// `1-a -> 2-c`, matching the scenario fixture used throughout S1-S4.
fn seed_doc0(store: &MemoryStore) -> DocId {
    let doc = DocId::new("doc0");

    let mut tx = store.transaction().unwrap();
    tx.put_revision(
        &doc,
        NewRevision::new(None, false, body("title", "root")).with_id(RevId::new("1-a")),
    )
    .unwrap();
    tx.commit().unwrap();

    let mut tx = store.transaction().unwrap();
    tx.put_revision(
        &doc,
        NewRevision::new(Some(RevId::new("1-a")), false, body("title", "phone"))
            .with_id(RevId::new("2-a")),
    )
    .unwrap();
    tx.put_revision(
        &doc,
        NewRevision::new(Some(RevId::new("1-a")), false, body("title", "laptop"))
            .with_id(RevId::new("2-b")),
    )
    .unwrap();
    tx.put_revision(
        &doc,
        NewRevision::new(Some(RevId::new("1-a")), true, Map::new()).with_id(RevId::new("2-c")),
    )
    .unwrap();
    tx.commit().unwrap();

    let mut tx = store.transaction().unwrap();
    tx.put_revision(
        &doc,
        NewRevision::new(Some(RevId::new("2-a")), false, body("title", "phone, again"))
            .with_id(RevId::new("3-a")),
    )
    .unwrap();
    tx.commit().unwrap();

    doc
}

#[test]
fn s1_resolver_picks_the_highest_generation() {
    let _ = env_logger::try_init();
    let store = MemoryStore::new();
    let doc = seed_doc0(&store);
    let engine = ConflictEngine::new(&store);

    engine.resolve(&doc, &HighestGenerationWins).unwrap();

    assert!(engine.conflicted_document_ids().is_empty());
    let winner = store.get(&doc).unwrap();
    assert_eq!(winner.rev_id, RevId::new("3-a"));
}

#[test]
fn s2_resolver_may_pick_a_smaller_generation() {
    let _ = env_logger::try_init();
    let store = MemoryStore::new();
    let doc = seed_doc0(&store);
    let engine = ConflictEngine::new(&store);

    let keep_laptop = |_: &DocId, conflicts: Vec<RevisionView>| {
        conflicts.into_iter().find(|r| r.rev_id == RevId::new("2-b"))
    };
    engine.resolve(&doc, &keep_laptop).unwrap();

    assert!(engine.conflicted_document_ids().is_empty());
    let winner = store.get(&doc).unwrap();
    assert_eq!(winner.rev_id, RevId::new("2-b"));
}

#[test]
fn s3_resolver_output_outside_the_conflict_set_is_rejected() {
    let _ = env_logger::try_init();
    let store = MemoryStore::new();
    let doc = seed_doc0(&store);
    let engine = ConflictEngine::new(&store);

    let rogue_resolver = |doc_id: &DocId, _: Vec<RevisionView>| {
        Some(RevisionView {
            doc_id: doc_id.clone(),
            rev_id: RevId::new("4-imaginary"),
            body: Map::new(),
            deleted: false,
            sequence: 0,
            attachments: Vec::new(),
        })
    };

    let err = engine.resolve(&doc, &rogue_resolver).unwrap_err();
    assert_eq!(err, revsync::error::ResolveError::InvalidResolverOutput);
    // The tree is untouched: still conflicted, same two active leaves.
    assert!(engine.conflicted_document_ids().contains(&doc));
    assert_eq!(store.active_revisions(&doc).len(), 2);
}

#[test]
fn s4_resolver_declining_to_pick_leaves_the_conflict_open() {
    let _ = env_logger::try_init();
    let store = MemoryStore::new();
    let doc = seed_doc0(&store);
    let engine = ConflictEngine::new(&store);

    let undecided = |_: &DocId, _: Vec<RevisionView>| None;
    engine.resolve(&doc, &undecided).unwrap();

    assert!(engine.conflicted_document_ids().contains(&doc));
    assert_eq!(store.active_revisions(&doc).len(), 2);
}

#[test]
fn s5_resolving_a_subset_of_conflicted_documents_leaves_the_rest_untouched() {
    let _ = env_logger::try_init();
    let store = MemoryStore::new();
    let mut docs = Vec::new();
    for i in 0..4 {
        let doc = DocId::new(format!("doc{i}"));
        let mut tx = store.transaction().unwrap();
        tx.put_revision(&doc, NewRevision::new(None, false, Map::new()).with_id(RevId::new("1-a")))
            .unwrap();
        tx.commit().unwrap();
        let mut tx = store.transaction().unwrap();
        tx.put_revision(
            &doc,
            NewRevision::new(Some(RevId::new("1-a")), false, Map::new()).with_id(RevId::new("2-a")),
        )
        .unwrap();
        tx.put_revision(
            &doc,
            NewRevision::new(Some(RevId::new("1-a")), false, Map::new()).with_id(RevId::new("2-b")),
        )
        .unwrap();
        tx.commit().unwrap();
        docs.push(doc);
    }

    let engine = ConflictEngine::new(&store);
    assert_eq!(engine.conflicted_document_ids().len(), 4);

    engine.resolve(&docs[0], &HighestGenerationWins).unwrap();
    engine.resolve(&docs[2], &HighestGenerationWins).unwrap();

    let mut remaining = engine.conflicted_document_ids();
    remaining.sort();
    let mut expected = vec![docs[1].clone(), docs[3].clone()];
    expected.sort();
    assert_eq!(remaining, expected);
}

#[test]
fn a_closure_can_act_as_a_resolver_directly() {
    let _ = env_logger::try_init();
    let store = MemoryStore::new();
    let doc = seed_doc0(&store);
    let engine = ConflictEngine::new(&store);

    fn resolve_with(engine: &ConflictEngine, doc: &DocId, resolver: &dyn Resolver) {
        engine.resolve(doc, resolver).unwrap();
    }
    resolve_with(&engine, &doc, &HighestGenerationWins);
    assert!(engine.conflicted_document_ids().is_empty());
}
