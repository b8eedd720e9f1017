//! Seeds a conflicted document, resolves it, then drives a pull replication
//! against a scripted transport to completion, logging delegate callbacks
//! along the way.

use revsync::config::{Direction, ReplicatorConfiguration};
use revsync::conflict::{ConflictEngine, HighestGenerationWins};
use revsync::replicator::{Delegate, Replicator, ReplicatorState};
use revsync::revision::{DocId, RevId};
use revsync::store::{MemoryStore, NewRevision, RevisionStore};
use revsync::transport::{ScriptedEvent, ScriptedTransportFactory};
use serde_json::{Map, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;

struct LoggingDelegate;

impl Delegate for LoggingDelegate {
    fn did_change_state(&self, replicator: &Replicator) {
        log::info!("replicator state changed to {:?}", replicator.state());
    }

    fn did_change_progress(&self, replicator: &Replicator) {
        log::info!(
            "replicator progress: {}/{}",
            replicator.changes_processed(),
            replicator.changes_total()
        );
    }

    fn did_complete(&self, _replicator: &Replicator) {
        log::info!("replication complete");
    }

    fn did_error(&self, _replicator: &Replicator, error: &revsync::error::Error) {
        log::error!("replication failed: {error}");
    }
}

fn body(key: &str, value: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(key.to_string(), Value::String(value.to_string()));
    m
}

fn seed_conflicted_document(store: &MemoryStore) -> DocId {
    let doc = DocId::new("demo-doc");
    let mut tx = store.transaction().expect("open transaction");
    tx.put_revision(
        &doc,
        NewRevision::new(None, false, body("title", "first draft")).with_id(RevId::new("1-a")),
    )
    .expect("insert root revision");
    tx.commit().expect("commit root revision");

    let mut tx = store.transaction().expect("open transaction");
    tx.put_revision(
        &doc,
        NewRevision::new(Some(RevId::new("1-a")), false, body("title", "edited on phone"))
            .with_id(RevId::new("2-a")),
    )
    .expect("insert phone branch");
    tx.put_revision(
        &doc,
        NewRevision::new(Some(RevId::new("1-a")), false, body("title", "edited on laptop"))
            .with_id(RevId::new("2-b")),
    )
    .expect("insert laptop branch");
    tx.commit().expect("commit conflicting branches");

    doc
}

fn main() {
    env_logger::init();

    let store = Arc::new(MemoryStore::new());
    let doc = seed_conflicted_document(&store);

    let engine = ConflictEngine::new(store.as_ref());
    log::info!("conflicted documents before resolution: {:?}", engine.conflicted_document_ids());
    engine
        .resolve(&doc, &HighestGenerationWins)
        .expect("conflict resolution should succeed");
    let winner = store.get(&doc).expect("exactly one active revision remains");
    log::info!("resolved winner: {} {:?}", winner.rev_id, winner.body);

    let remote = env::args().nth(1).unwrap_or_else(|| "ws://example.invalid/demo".to_string());
    let config = ReplicatorConfiguration::builder(Direction::Pull)
        .local(store)
        .remote(remote)
        .build()
        .expect("valid configuration");

    let factory = Arc::new(ScriptedTransportFactory::new());
    let replicator = Replicator::new(config, factory.clone());
    replicator.set_delegate(Arc::new(LoggingDelegate));
    replicator.start().expect("replication should start");

    let transport = factory.last_created().expect("transport job should have been built");
    transport.spawn_script(vec![
        ScriptedEvent::Started,
        ScriptedEvent::Progress(1, 3),
        ScriptedEvent::Progress(3, 3),
        ScriptedEvent::Stopped(None),
    ]);

    while replicator.state() != ReplicatorState::Complete
        && replicator.state() != ReplicatorState::Error
        && replicator.state() != ReplicatorState::Stopped
    {
        std::thread::sleep(Duration::from_millis(10));
    }
    log::info!("demo finished in state {:?}", replicator.state());
}
