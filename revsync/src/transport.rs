//! The `Transport` interface the replicator controller drives,
//! plus `ScriptedTransport` — the one in-process implementation this crate
//! ships so the controller's state machine can be exercised deterministically
//! without real network I/O.

use crate::error::TransportError;
use crate::filter::{FilterParams, TransportFilter};
use crate::interceptor::Interceptor;
use crate::store::RevisionStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A snapshot of transport-reported properties, delivered alongside a
/// `progress`/`stopped` event the way a real transport would report its
/// whole status at once rather than a diff.
#[derive(Debug, Clone, Default)]
pub struct TransportStatus {
    pub running: bool,
    pub changes_processed: i64,
    pub changes_total: i64,
    pub error: Option<TransportError>,
}

/// Observes lifecycle events emitted by a `Transport` job. A `Replicator`
/// installs itself as the sole observer of its own job.
pub trait TransportObserver: Send + Sync {
    fn on_started(&self);
    fn on_progress(&self, status: TransportStatus);
    fn on_stopped(&self, status: TransportStatus);
}

/// A running (or not-yet-started) push/pull job. Out of scope as a concrete
/// wire protocol — only this trait and the scripted reference
/// implementation below are defined here.
pub trait Transport: Send + Sync {
    fn start(&self);
    fn stop(&self);
    /// Cancel before any `started` event has been delivered. Returns `true`
    /// if the cancellation took effect; `false` if the job had already
    /// begun and must be stopped normally instead.
    fn cancel_if_not_started(&self) -> bool;
    fn session_id(&self) -> &str;
    fn set_observer(&self, observer: Arc<dyn TransportObserver>);
    fn clear_observer(&self);
}

/// Parameters the adapter layer derives from a
/// [`crate::config::ReplicatorConfiguration`] and hands to a
/// [`TransportFactory`].
pub struct TransportParams {
    pub local: Arc<dyn RevisionStore>,
    pub remote: String,
    pub push: bool,
    pub continuous: bool,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    pub filter_name: Option<String>,
    pub filter_params: FilterParams,
    pub request_headers: BTreeMap<String, String>,
    pub reset: bool,
    pub heartbeat: Option<std::time::Duration>,
    pub push_filter: Option<Arc<dyn TransportFilter>>,
}

/// Constructs a [`Transport`] job from [`TransportParams`].
pub trait TransportFactory: Send + Sync {
    fn new_job(&self, params: TransportParams) -> Result<Arc<dyn Transport>, TransportError>;
}

#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Started,
    Progress(i64, i64),
    Stopped(Option<TransportError>),
}

/// A [`Transport`] driven entirely by explicit `deliver_*` calls rather
/// than by real I/O, so tests can reproduce every transition in the
/// replicator's state diagram without a timing-dependent race.
pub struct ScriptedTransport {
    session_id: String,
    observer: Mutex<Option<Arc<dyn TransportObserver>>>,
    started_delivered: AtomicBool,
    running: AtomicBool,
    changes_processed: AtomicI64,
    changes_total: AtomicI64,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedTransport {
            session_id: Uuid::new_v4().to_string(),
            observer: Mutex::new(None),
            started_delivered: AtomicBool::new(false),
            running: AtomicBool::new(false),
            changes_processed: AtomicI64::new(0),
            changes_total: AtomicI64::new(0),
        })
    }

    fn status(&self, error: Option<TransportError>) -> TransportStatus {
        TransportStatus {
            running: self.running.load(Ordering::SeqCst),
            changes_processed: self.changes_processed.load(Ordering::SeqCst),
            changes_total: self.changes_total.load(Ordering::SeqCst),
            error,
        }
    }

    pub fn deliver_started(&self) {
        self.started_delivered.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        if let Some(observer) = self.observer.lock().expect("observer mutex poisoned").clone() {
            observer.on_started();
        }
    }

    pub fn deliver_progress(&self, processed: i64, total: i64) {
        self.changes_processed.store(processed, Ordering::SeqCst);
        self.changes_total.store(total, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let status = self.status(None);
        if let Some(observer) = self.observer.lock().expect("observer mutex poisoned").clone() {
            observer.on_progress(status);
        }
    }

    pub fn deliver_stopped(&self, error: Option<TransportError>) {
        self.running.store(false, Ordering::SeqCst);
        let status = self.status(error);
        if let Some(observer) = self.observer.lock().expect("observer mutex poisoned").clone() {
            observer.on_stopped(status);
        }
    }

    /// Convenience for the demo binary: play an entire script on a
    /// background thread.
    pub fn spawn_script(self: &Arc<Self>, script: Vec<ScriptedEvent>) {
        let transport = Arc::clone(self);
        std::thread::spawn(move || {
            for event in script {
                match event {
                    ScriptedEvent::Started => transport.deliver_started(),
                    ScriptedEvent::Progress(p, t) => transport.deliver_progress(p, t),
                    ScriptedEvent::Stopped(err) => transport.deliver_stopped(err),
                }
            }
        });
    }
}

impl Transport for ScriptedTransport {
    fn start(&self) {
        // A real transport would spin up its worker thread here; this
        // reference transport waits for the test (or the demo's
        // `spawn_script`) to drive it explicitly.
    }

    fn stop(&self) {
        // Termination is observed only via `deliver_stopped`;
        // a real transport would request cancellation of its worker here.
    }

    fn cancel_if_not_started(&self) -> bool {
        !self.started_delivered.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn set_observer(&self, observer: Arc<dyn TransportObserver>) {
        *self.observer.lock().expect("observer mutex poisoned") = Some(observer);
    }

    fn clear_observer(&self) {
        *self.observer.lock().expect("observer mutex poisoned") = None;
    }
}

/// Builds [`ScriptedTransport`] jobs; can be told to refuse construction so
/// tests can exercise `TransportInitFailed`. Remembers the last
/// job it built so a caller that only holds the factory (as the demo binary
/// does, and as tests do) can still reach in and drive the scripted events.
pub struct ScriptedTransportFactory {
    refuse: AtomicBool,
    last_created: Mutex<Option<Arc<ScriptedTransport>>>,
}

impl ScriptedTransportFactory {
    pub fn new() -> Self {
        ScriptedTransportFactory {
            refuse: AtomicBool::new(false),
            last_created: Mutex::new(None),
        }
    }

    pub fn refusing() -> Self {
        ScriptedTransportFactory {
            refuse: AtomicBool::new(true),
            last_created: Mutex::new(None),
        }
    }

    pub fn last_created(&self) -> Option<Arc<ScriptedTransport>> {
        self.last_created.lock().expect("factory mutex poisoned").clone()
    }
}

impl Default for ScriptedTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for ScriptedTransportFactory {
    fn new_job(&self, _params: TransportParams) -> Result<Arc<dyn Transport>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::new(
                crate::error::ErrorDomain::Transport,
                1,
                "transport refused to construct",
            ));
        }
        let transport = ScriptedTransport::new();
        *self.last_created.lock().expect("factory mutex poisoned") = Some(Arc::clone(&transport));
        Ok(transport)
    }
}
