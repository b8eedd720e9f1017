//! `RevisionStore`: the transactional datastore the core treats as an
//! external collaborator, plus `MemoryStore`, the one
//! in-process implementation this crate ships so the conflict engine and
//! the replicator can be exercised without a real database.

use crate::error::StoreError;
use crate::revision::{new_revision_id, AttachmentRef, DocId, Revision, RevId};
use log::trace;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// A new revision to insert, either freshly created locally (`rev_id: None`,
/// the store mints one) or replayed with an explicit ID (`rev_id: Some(_)`,
/// e.g. a revision pulled from a remote peer, or a tombstone the conflict
/// engine is appending at a generation it already computed).
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub rev_id: Option<RevId>,
    pub parent: Option<RevId>,
    pub deleted: bool,
    pub body: Map<String, Value>,
    /// `None` means "inherit the parent's attachments, same revpos, new
    /// sequence"; `Some(_)` replaces them outright.
    pub attachments: Option<Vec<AttachmentRef>>,
}

impl NewRevision {
    pub fn new(parent: Option<RevId>, deleted: bool, body: Map<String, Value>) -> Self {
        NewRevision {
            rev_id: None,
            parent,
            deleted,
            body,
            attachments: None,
        }
    }

    pub fn with_id(mut self, rev_id: RevId) -> Self {
        self.rev_id = Some(rev_id);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = Some(attachments);
        self
    }
}

/// One document's transaction-scoped write handle. Dropping it without
/// calling `commit` rolls back every insert made through it.
pub trait StoreTransaction {
    fn put_revision(&mut self, doc: &DocId, new_rev: NewRevision) -> Result<Revision, StoreError>;
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// The persistence layer consumed by the conflict engine and, indirectly,
/// by a `Transport` pushing/pulling revisions. Out of scope as a concrete
/// wire/disk format — only this trait, plus the in-process reference
/// implementation below, are defined here.
pub trait RevisionStore: Send + Sync {
    fn document_ids(&self) -> Vec<DocId>;
    fn active_revisions(&self, doc: &DocId) -> Vec<Revision>;
    fn attachments(&self, doc: &DocId) -> Vec<AttachmentRef>;
    fn transaction(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;
    /// Look up one revision of `doc` by id, regardless of whether it's
    /// still active.
    fn revision(&self, doc: &DocId, rev_id: &RevId) -> Option<Revision>;

    /// Convenience used by scenario tests and the demo: the sole active
    /// revision of a non-conflicted document, if any.
    fn get(&self, doc: &DocId) -> Option<Revision> {
        let mut active = self.active_revisions(doc);
        if active.len() == 1 {
            active.pop()
        } else {
            None
        }
    }

    /// Walk `rev`'s ancestry up to and including the root, following
    /// `parent` pointers. The result starts at `rev` and ends at the root;
    /// a dangling parent pointer simply truncates the walk.
    fn parent_chain(&self, doc: &DocId, rev: &Revision) -> Vec<Revision> {
        let mut chain = vec![rev.clone()];
        while let Some(parent_id) = chain.last().and_then(|r| r.parent.clone()) {
            match self.revision(doc, &parent_id) {
                Some(parent) => chain.push(parent),
                None => break,
            }
        }
        chain
    }
}

#[derive(Default)]
struct DocRecord {
    revisions: HashMap<RevId, Revision>,
    next_sequence: u64,
}

/// Non-durable, process-memory `RevisionStore`. Every document's
/// revisions live behind one mutex; simple enough to reason about in
/// tests and in the demo binary, at the cost of whole-store contention.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<DocId, DocRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl RevisionStore for MemoryStore {
    fn document_ids(&self) -> Vec<DocId> {
        self.docs.lock().expect("MemoryStore mutex poisoned").keys().cloned().collect()
    }

    fn active_revisions(&self, doc: &DocId) -> Vec<Revision> {
        let docs = self.docs.lock().expect("MemoryStore mutex poisoned");
        let Some(record) = docs.get(doc) else {
            return Vec::new();
        };
        let parents: HashSet<&RevId> = record
            .revisions
            .values()
            .filter_map(|rev| rev.parent.as_ref())
            .collect();
        record
            .revisions
            .values()
            .filter(|rev| rev.is_active() && !parents.contains(&rev.rev_id))
            .cloned()
            .collect()
    }

    fn attachments(&self, doc: &DocId) -> Vec<AttachmentRef> {
        let docs = self.docs.lock().expect("MemoryStore mutex poisoned");
        docs.get(doc)
            .map(|record| {
                record
                    .revisions
                    .values()
                    .flat_map(|rev| rev.attachments.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn revision(&self, doc: &DocId, rev_id: &RevId) -> Option<Revision> {
        let docs = self.docs.lock().expect("MemoryStore mutex poisoned");
        docs.get(doc)?.revisions.get(rev_id).cloned()
    }

    fn transaction(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            finished: false,
            pending: Vec::new(),
        }))
    }
}

struct MemoryTransaction<'s> {
    store: &'s MemoryStore,
    finished: bool,
    pending: Vec<(DocId, Revision)>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn put_revision(&mut self, doc: &DocId, new_rev: NewRevision) -> Result<Revision, StoreError> {
        let docs = self.store.docs.lock().expect("MemoryStore mutex poisoned");
        let existing_parent_attachments = new_rev
            .parent
            .as_ref()
            .and_then(|parent_id| docs.get(doc).and_then(|r| r.revisions.get(parent_id)))
            .map(|parent| parent.attachments.clone());
        if let Some(parent_id) = &new_rev.parent {
            let present = docs
                .get(doc)
                .map(|r| r.revisions.contains_key(parent_id))
                .unwrap_or(false);
            if !present {
                return Err(StoreError(format!(
                    "parent revision {} of document {} not present in store",
                    parent_id, doc
                )));
            }
        }
        drop(docs);

        let generation = new_rev
            .parent
            .as_ref()
            .map(|p| p.generation() + 1)
            .unwrap_or(1);
        let rev_id = new_rev.rev_id.unwrap_or_else(|| new_revision_id(generation));
        let rev_id_generation = rev_id.try_generation().ok_or_else(|| {
            StoreError(format!("malformed revision id: {}", rev_id))
        })?;
        if rev_id_generation != generation {
            return Err(StoreError(format!(
                "revision {} does not match expected generation {}",
                rev_id, generation
            )));
        }

        let revision = Revision {
            rev_id,
            parent: new_rev.parent,
            deleted: new_rev.deleted,
            body: new_rev.body,
            sequence: 0, // assigned at commit time, once sequencing is final
            attachments: new_rev
                .attachments
                .or(existing_parent_attachments)
                .unwrap_or_default(),
        };
        self.pending.push((doc.clone(), revision.clone()));
        Ok(revision)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finished = true;
        let mut docs = self.store.docs.lock().expect("MemoryStore mutex poisoned");
        for (doc, mut revision) in self.pending.drain(..) {
            let record = docs.entry(doc.clone()).or_default();
            record.next_sequence += 1;
            revision.sequence = record.next_sequence;
            trace!("committing revision {} for doc {}", revision.rev_id, doc);
            record.revisions.insert(revision.rev_id.clone(), revision);
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.pending.is_empty() {
            trace!("rolling back {} uncommitted revision(s)", self.pending.len());
        }
    }
}
