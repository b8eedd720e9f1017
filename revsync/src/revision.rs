//! In-memory representation of a document's revision DAG.

use serde_json::{Map, Value};
use std::fmt;

/// Opaque document identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(pub String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        DocId(id.into())
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        DocId(s.to_string())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        DocId(s)
    }
}

/// A revision ID, e.g. `"3-cafef00d"`. The integer prefix before the first
/// `-` is the generation; it is always derivable from the ID itself rather
/// than stored separately, so two equal IDs can never disagree on generation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevId(pub String);

impl RevId {
    pub fn new(id: impl Into<String>) -> Self {
        RevId(id.into())
    }

    /// Parse the generation prefix. Panics on a malformed ID: every `RevId`
    /// in this crate is either hand-built by a test or minted by
    /// [`new_revision_id`], both of which always produce a valid prefix.
    /// Callers handling a revision ID of external origin (e.g. one pulled
    /// from a remote peer) should use [`RevId::try_generation`] instead.
    pub fn generation(&self) -> u32 {
        self.try_generation()
            .unwrap_or_else(|| panic!("malformed RevId: {}", self.0))
    }

    /// Parse the generation prefix without panicking, for revision IDs
    /// whose format hasn't already been established as valid.
    pub fn try_generation(&self) -> Option<u32> {
        self.0.split('-').next()?.parse().ok()
    }
}

impl fmt::Display for RevId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Mint a fresh revision ID at the given generation. Mirrors the shape of a
/// real digest-based rev-id (`generation-digest`) without depending on a
/// particular hash over the body, since no wire format is defined here.
pub fn new_revision_id(generation: u32) -> RevId {
    RevId(format!("{generation}-{}", uuid::Uuid::new_v4().simple()))
}

/// Reference to an attachment, keyed by the sequence of the revision that
/// introduced or last carried it forward.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRef {
    pub sequence: u64,
    pub filename: String,
    pub mime_type: String,
    pub length: u64,
    pub revpos: u32,
    pub encoding: Option<String>,
    pub encoded_length: Option<u64>,
}

/// A single revision in a document's DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub rev_id: RevId,
    pub parent: Option<RevId>,
    pub deleted: bool,
    pub body: Map<String, Value>,
    pub sequence: u64,
    pub attachments: Vec<AttachmentRef>,
}

impl Revision {
    pub fn generation(&self) -> u32 {
        self.rev_id.generation()
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

/// Full projection of a [`Revision`] handed to a [`crate::conflict::Resolver`].
/// Unlike [`crate::filter::FilterRevisionView`], this carries attachments —
/// conflict resolution needs to know what it might orphan.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionView {
    pub doc_id: DocId,
    pub rev_id: RevId,
    pub body: Map<String, Value>,
    pub deleted: bool,
    pub sequence: u64,
    pub attachments: Vec<AttachmentRef>,
}

impl RevisionView {
    pub fn from_revision(doc_id: DocId, rev: &Revision) -> Self {
        RevisionView {
            doc_id,
            rev_id: rev.rev_id.clone(),
            body: rev.body.clone(),
            deleted: rev.deleted,
            sequence: rev.sequence,
            attachments: rev.attachments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_parses_prefix() {
        assert_eq!(RevId::new("3-abcdef").generation(), 3);
        assert_eq!(RevId::new("12-deadbeef").generation(), 12);
    }

    #[test]
    fn minted_ids_carry_the_requested_generation() {
        let rev = new_revision_id(7);
        assert_eq!(rev.generation(), 7);
    }

    #[test]
    fn try_generation_rejects_malformed_ids_without_panicking() {
        assert_eq!(RevId::new("not-a-number-abcdef").try_generation(), None);
        assert_eq!(RevId::new("nodash").try_generation(), None);
        assert_eq!(RevId::new("3-abcdef").try_generation(), Some(3));
    }
}
