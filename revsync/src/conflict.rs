//! Conflict Resolution Engine: enumerates conflicted documents,
//! invokes a user-supplied resolver, and collapses a document's revision
//! tree to a single winner.

use crate::error::{ResolveError, StoreError};
use crate::revision::{DocId, RevId, RevisionView};
use crate::store::{NewRevision, RevisionStore};
use log::{info, warn};
use serde_json::Map;

/// Decides, among a document's active revisions, which one should remain
/// the sole active leaf. Implementors compare by [`RevId`]; returning any
/// revision not present in `conflicts` is an error.
pub trait Resolver {
    fn resolve(&self, doc_id: &DocId, conflicts: Vec<RevisionView>) -> Option<RevisionView>;
}

impl<F> Resolver for F
where
    F: Fn(&DocId, Vec<RevisionView>) -> Option<RevisionView>,
{
    fn resolve(&self, doc_id: &DocId, conflicts: Vec<RevisionView>) -> Option<RevisionView> {
        self(doc_id, conflicts)
    }
}

/// A resolver that always picks the revision with the highest generation,
/// breaking ties by `RevId` ordering. Used by the demo binary and by
/// tests exercising scenario S1.
pub struct HighestGenerationWins;

impl Resolver for HighestGenerationWins {
    fn resolve(&self, _doc_id: &DocId, conflicts: Vec<RevisionView>) -> Option<RevisionView> {
        conflicts
            .into_iter()
            .max_by_key(|rev| (rev.rev_id.generation(), rev.rev_id.clone()))
    }
}

/// Operates over a single [`RevisionStore`]. Each call to [`resolve`] is a
/// pure, transactional function; the engine keeps no state of its own.
pub struct ConflictEngine<'s> {
    store: &'s dyn RevisionStore,
}

impl<'s> ConflictEngine<'s> {
    pub fn new(store: &'s dyn RevisionStore) -> Self {
        ConflictEngine { store }
    }

    /// Every document with at least two active revisions. Order is
    /// unspecified.
    pub fn conflicted_document_ids(&self) -> Vec<DocId> {
        self.store
            .document_ids()
            .into_iter()
            .filter(|doc| self.store.active_revisions(doc).len() >= 2)
            .collect()
    }

    /// Resolve conflicts on one document in a single transaction. Returns
    /// `Ok` without calling `resolver` if the document has fewer than two
    /// active revisions.
    pub fn resolve(&self, doc: &DocId, resolver: &dyn Resolver) -> Result<(), ResolveError> {
        let active = self.store.active_revisions(doc);
        if active.len() < 2 {
            return Ok(());
        }

        let conflicts: Vec<RevisionView> = active
            .iter()
            .map(|rev| RevisionView::from_revision(doc.clone(), rev))
            .collect();
        let conflict_ids: Vec<&RevId> = active.iter().map(|r| &r.rev_id).collect();

        let winner = match resolver.resolve(doc, conflicts) {
            None => {
                info!("conflict on doc {doc} left unresolved by resolver");
                return Ok(());
            }
            Some(winner) => winner,
        };

        if !conflict_ids.contains(&&winner.rev_id) {
            warn!(
                "resolver for doc {doc} returned a revision ({}) outside the conflict set",
                winner.rev_id
            );
            return Err(ResolveError::InvalidResolverOutput);
        }

        let tx = self
            .store
            .transaction()
            .map_err(|e: StoreError| ResolveError::Store(e))?;
        collapse(tx, doc, &active, &winner.rev_id)?;
        info!("resolved conflict on doc {doc}, winner {}", winner.rev_id);
        Ok(())
    }

    /// Like [`resolve`], but fails with [`ResolveError::ResolverNotFound`]
    /// when `resolver` is `None` — the shape a pull replication's automatic
    /// conflict handling actually calls.
    pub fn resolve_with(
        &self,
        doc: &DocId,
        resolver: Option<&dyn Resolver>,
    ) -> Result<(), ResolveError> {
        match resolver {
            Some(resolver) => self.resolve(doc, resolver),
            None => Err(ResolveError::ResolverNotFound),
        }
    }
}

/// Appends a tombstone child to every losing branch, inside one
/// transaction. The winner is left untouched.
fn collapse(
    mut tx: Box<dyn crate::store::StoreTransaction + '_>,
    doc: &DocId,
    active: &[crate::revision::Revision],
    winner: &RevId,
) -> Result<(), ResolveError> {
    for loser in active.iter().filter(|r| &r.rev_id != winner) {
        let tombstone = NewRevision::new(Some(loser.rev_id.clone()), true, Map::new());
        tx.put_revision(doc, tombstone)
            .map_err(ResolveError::Store)?;
    }
    tx.commit().map_err(ResolveError::Store)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::AttachmentRef;
    use crate::store::MemoryStore;

    fn seed_doc0(store: &MemoryStore) -> DocId {
        let doc = DocId::new("doc0");
        let mut tx = store.transaction().unwrap();
        tx.put_revision(
            &doc,
            NewRevision::new(None, false, body("foo1", "bar1")).with_id(RevId::new("1-a")),
        )
        .unwrap();
        tx.commit().unwrap();

        let mut tx = store.transaction().unwrap();
        tx.put_revision(
            &doc,
            NewRevision::new(Some(RevId::new("1-a")), false, body("foo2.a", "bar2.a"))
                .with_id(RevId::new("2-a")),
        )
        .unwrap();
        tx.put_revision(
            &doc,
            NewRevision::new(Some(RevId::new("1-a")), false, body("foo2.b", "bar2.b"))
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
            NewRevision::new(Some(RevId::new("2-a")), false, body("foo3.a", "bar3.a"))
                .with_id(RevId::new("3-a")),
        )
        .unwrap();
        tx.commit().unwrap();

        doc
    }

    fn body(key: &str, value: &str) -> Map<String, serde_json::Value> {
        let mut m = Map::new();
        m.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        m
    }

    #[test]
    fn s1_collapse_to_biggest_generation() {
        let store = MemoryStore::new();
        let doc = seed_doc0(&store);
        let engine = ConflictEngine::new(&store);

        engine.resolve(&doc, &HighestGenerationWins).unwrap();

        assert!(engine.conflicted_document_ids().is_empty());
        let winner = store.get(&doc).unwrap();
        assert_eq!(winner.generation(), 3);
        assert_eq!(
            winner.body.get("foo3.a").and_then(|v| v.as_str()),
            Some("bar3.a")
        );
    }

    #[test]
    fn s2_collapse_to_smaller_generation() {
        let store = MemoryStore::new();
        let doc = seed_doc0(&store);
        let engine = ConflictEngine::new(&store);

        let resolver = |_: &DocId, conflicts: Vec<RevisionView>| {
            conflicts.into_iter().find(|r| r.rev_id.0 == "2-b")
        };
        engine.resolve(&doc, &resolver).unwrap();

        let winner = store.get(&doc).unwrap();
        assert_eq!(winner.generation(), 2);
        assert_eq!(
            winner.body.get("foo2.b").and_then(|v| v.as_str()),
            Some("bar2.b")
        );

        assert!(engine.conflicted_document_ids().is_empty());
        assert_eq!(store.active_revisions(&doc).len(), 1);
    }

    #[test]
    fn s3_invalid_resolver_output_leaves_tree_unchanged() {
        let store = MemoryStore::new();
        let doc = seed_doc0(&store);
        let engine = ConflictEngine::new(&store);

        let resolver = |doc_id: &DocId, _: Vec<RevisionView>| {
            Some(RevisionView {
                doc_id: doc_id.clone(),
                rev_id: RevId::new("99-notreal"),
                body: Map::new(),
                deleted: false,
                sequence: 0,
                attachments: Vec::new(),
            })
        };

        let err = engine.resolve(&doc, &resolver).unwrap_err();
        assert_eq!(err, ResolveError::InvalidResolverOutput);
        assert!(engine.conflicted_document_ids().contains(&doc));
        assert_eq!(store.active_revisions(&doc).len(), 2);
    }

    #[test]
    fn s4_resolver_returning_none_leaves_doc_conflicted() {
        let store = MemoryStore::new();
        let doc = seed_doc0(&store);
        let engine = ConflictEngine::new(&store);

        let resolver = |_: &DocId, _: Vec<RevisionView>| None;
        engine.resolve(&doc, &resolver).unwrap();

        assert!(engine.conflicted_document_ids().contains(&doc));
        assert_eq!(store.active_revisions(&doc).len(), 2);
    }

    #[test]
    fn s5_subset_resolution_over_four_docs() {
        let store = MemoryStore::new();
        let mut docs = Vec::new();
        for i in 0..4 {
            let doc = DocId::new(format!("doc{i}"));
            let mut tx = store.transaction().unwrap();
            tx.put_revision(
                &doc,
                NewRevision::new(None, false, Map::new()).with_id(RevId::new("1-a")),
            )
            .unwrap();
            tx.commit().unwrap();
            let mut tx = store.transaction().unwrap();
            tx.put_revision(
                &doc,
                NewRevision::new(Some(RevId::new("1-a")), false, Map::new())
                    .with_id(RevId::new("2-a")),
            )
            .unwrap();
            tx.put_revision(
                &doc,
                NewRevision::new(Some(RevId::new("1-a")), false, Map::new())
                    .with_id(RevId::new("2-b")),
            )
            .unwrap();
            tx.commit().unwrap();
            docs.push(doc);
        }

        let engine = ConflictEngine::new(&store);
        assert_eq!(engine.conflicted_document_ids().len(), 4);

        engine.resolve(&docs[0], &HighestGenerationWins).unwrap();
        engine.resolve(&docs[1], &HighestGenerationWins).unwrap();

        let mut remaining = engine.conflicted_document_ids();
        remaining.sort();
        assert_eq!(remaining, vec![docs[2].clone(), docs[3].clone()]);
    }

    #[test]
    fn resolve_on_non_conflicted_document_does_not_call_resolver() {
        let store = MemoryStore::new();
        let doc = DocId::new("solo");
        let mut tx = store.transaction().unwrap();
        tx.put_revision(&doc, NewRevision::new(None, false, Map::new()))
            .unwrap();
        tx.commit().unwrap();

        let engine = ConflictEngine::new(&store);
        struct Panicking;
        impl Resolver for Panicking {
            fn resolve(&self, _: &DocId, _: Vec<RevisionView>) -> Option<RevisionView> {
                panic!("resolver must not be called");
            }
        }
        engine.resolve(&doc, &Panicking).unwrap();
    }

    #[test]
    fn resolve_with_no_resolver_reports_resolver_not_found() {
        let store = MemoryStore::new();
        let doc = seed_doc0(&store);
        let engine = ConflictEngine::new(&store);
        assert_eq!(
            engine.resolve_with(&doc, None).unwrap_err(),
            ResolveError::ResolverNotFound
        );
    }

    #[test]
    fn attachments_remain_addressable_by_sequence_after_resolve() {
        let store = MemoryStore::new();
        let doc = DocId::new("doc-with-attachment");
        let attachment = AttachmentRef {
            sequence: 1,
            filename: "photo.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            length: 1024,
            revpos: 1,
            encoding: None,
            encoded_length: None,
        };
        let mut tx = store.transaction().unwrap();
        tx.put_revision(
            &doc,
            NewRevision::new(None, false, Map::new())
                .with_id(RevId::new("1-a"))
                .with_attachments(vec![attachment.clone()]),
        )
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

        let engine = ConflictEngine::new(&store);
        engine.resolve(&doc, &HighestGenerationWins).unwrap();

        let attachments = store.attachments(&doc);
        assert!(attachments.iter().any(|a| a.sequence == attachment.sequence));
    }
}
