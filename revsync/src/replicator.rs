//! Replicator Controller: a fire-and-forget handle that drives a
//! single push or pull replication session through its state machine.

use crate::config::{Direction, ReplicatorConfiguration};
use crate::error::{Error, Result};
use crate::filter::bridge_filter;
use crate::transport::{Transport, TransportFactory, TransportObserver, TransportParams, TransportStatus};
use log::{info, trace, warn};
use std::sync::{Arc, Mutex};

/// The states a [`Replicator`] can be in. `Pending`, `Started` and
/// `Stopping` are active; the rest are terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatorState {
    Pending,
    Started,
    Stopping,
    Stopped,
    Complete,
    Error,
}

impl ReplicatorState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReplicatorState::Pending | ReplicatorState::Started | ReplicatorState::Stopping
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Fire-and-forget delegate callbacks. All methods default to doing
/// nothing so implementors override only what they need; the controller
/// tolerates a missing delegate entirely.
pub trait Delegate: Send + Sync {
    fn did_change_state(&self, _replicator: &Replicator) {}
    fn did_change_progress(&self, _replicator: &Replicator) {}
    fn did_complete(&self, _replicator: &Replicator) {}
    fn did_error(&self, _replicator: &Replicator, _error: &Error) {}
}

struct Inner {
    state: ReplicatorState,
    started: bool,
    error: Option<Error>,
    changes_processed: i64,
    changes_total: i64,
    transport: Option<Arc<dyn Transport>>,
    /// The strong self-reference that keeps this controller alive across
    /// async transport callbacks even if the caller drops its own handle.
    /// Released exactly once, when `stopped` fires.
    self_retention: Option<Arc<Replicator>>,
}

struct Snapshot {
    state: ReplicatorState,
    changes_processed: i64,
    changes_total: i64,
}

struct Signals {
    state_changed: bool,
    progress_changed: bool,
    completing: bool,
    erroring: bool,
}

fn snapshot(inner: &Inner) -> Snapshot {
    Snapshot {
        state: inner.state,
        changes_processed: inner.changes_processed,
        changes_total: inner.changes_total,
    }
}

fn compute_signals(old: &Snapshot, new: &Snapshot) -> Signals {
    Signals {
        state_changed: old.state != new.state,
        progress_changed: old.changes_processed != new.changes_processed
            || old.changes_total != new.changes_total,
        completing: old.state.is_active()
            && new.state.is_terminal()
            && new.state != ReplicatorState::Error,
        erroring: old.state.is_active() && new.state == ReplicatorState::Error,
    }
}

/// Drives a single push or pull replication session to completion. Created
/// via [`crate::registry::Registry::create_replicator`] (or [`Replicator::new`]
/// directly); callers may drop their handle immediately after `start()` —
/// the self-retention keeps it alive until the transport reports `stopped`.
pub struct Replicator {
    config: ReplicatorConfiguration,
    transport_factory: Arc<dyn TransportFactory>,
    inner: Mutex<Inner>,
    delegate: Mutex<Option<Arc<dyn Delegate>>>,
}

impl Replicator {
    pub fn new(config: ReplicatorConfiguration, transport_factory: Arc<dyn TransportFactory>) -> Arc<Self> {
        Arc::new(Replicator {
            config,
            transport_factory,
            inner: Mutex::new(Inner {
                state: ReplicatorState::Pending,
                started: false,
                error: None,
                changes_processed: 0,
                changes_total: 0,
                transport: None,
                self_retention: None,
            }),
            delegate: Mutex::new(None),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn Delegate>) {
        *self.delegate.lock().expect("delegate mutex poisoned") = Some(delegate);
    }

    pub fn state(&self) -> ReplicatorState {
        self.inner.lock().expect("replicator mutex poisoned").state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn changes_processed(&self) -> i64 {
        self.inner.lock().expect("replicator mutex poisoned").changes_processed
    }

    pub fn changes_total(&self) -> i64 {
        self.inner.lock().expect("replicator mutex poisoned").changes_total
    }

    /// Non-fatal transport errors mid-run are never surfaced: only a terminal `Error` state yields a value here.
    pub fn error(&self) -> Option<Error> {
        let inner = self.inner.lock().expect("replicator mutex poisoned");
        if inner.state == ReplicatorState::Error {
            inner.error.clone()
        } else {
            None
        }
    }

    /// Build the adapter's `TransportParams` from configuration: bridges
    /// the push filter and resolves the interceptor chain,
    /// including credential-to-interceptor promotion.
    fn build_transport_params(&self) -> Result<TransportParams> {
        let local = self
            .config
            .local
            .clone()
            .ok_or(Error::UndefinedSource)?;
        if self.config.remote.is_empty() {
            return Err(Error::UndefinedSource);
        }
        let push = self.config.direction == Direction::Push;
        let push_filter = if push {
            self.config.push_filter.clone().map(bridge_filter)
        } else {
            None
        };
        Ok(TransportParams {
            local,
            remote: self.config.remote.clone(),
            push,
            continuous: false,
            interceptors: self.config.resolved_interceptors(),
            filter_name: self.config.filter_name.clone(),
            filter_params: self.config.filter_params.clone(),
            request_headers: self.config.optional_headers.clone(),
            reset: false,
            heartbeat: None,
            push_filter,
        })
    }

    /// Start replication. May succeed at most once per controller; every later call fails with [`Error::AlreadyStarted`]
    /// without touching state.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut inner = self.inner.lock().expect("replicator mutex poisoned");
            if inner.started || inner.state != ReplicatorState::Pending {
                return Err(Error::AlreadyStarted);
            }
            inner.started = true;
        }

        let params = match self.build_transport_params() {
            Ok(params) => params,
            Err(err) => {
                self.fail_to_start(err.clone());
                return Err(err);
            }
        };

        let transport = match self.transport_factory.new_job(params) {
            Ok(transport) => transport,
            Err(transport_err) => {
                let err = Error::TransportInitFailed(transport_err);
                self.fail_to_start(err.clone());
                return Err(err);
            }
        };

        {
            let mut inner = self.inner.lock().expect("replicator mutex poisoned");
            // Reset counters before subscribing to progress events so no
            // concurrently-arriving event can be clobbered by the reset
            //.
            inner.changes_processed = 0;
            inner.changes_total = 0;
            inner.transport = Some(Arc::clone(&transport));
            inner.self_retention = Some(Arc::clone(self));
            // State stays `Pending` until the transport's own `started`
            // event arrives — `start()` only kicks the job off.
        }

        transport.set_observer(Arc::clone(self) as Arc<dyn TransportObserver>);
        trace!("replicator starting transport job");
        transport.start();
        Ok(())
    }

    fn fail_to_start(&self, err: Error) {
        warn!("replicator failed to start: {err}");
        let mut inner = self.inner.lock().expect("replicator mutex poisoned");
        inner.state = ReplicatorState::Error;
        inner.error = Some(err);
        drop(inner);
        self.fire(Signals {
            state_changed: true,
            progress_changed: false,
            completing: false,
            erroring: true,
        });
    }

    /// Request cancellation. Idempotent and safe from any
    /// state; a no-op once terminal.
    pub fn stop(&self) -> bool {
        let mut inner = self.inner.lock().expect("replicator mutex poisoned");
        match inner.state {
            ReplicatorState::Pending => {
                let transport = inner.transport.clone();
                let cancelled = transport
                    .as_ref()
                    .map(|t| t.cancel_if_not_started())
                    .unwrap_or(true);
                if cancelled {
                    let old = snapshot(&inner);
                    inner.state = ReplicatorState::Stopped;
                    if let Some(transport) = inner.transport.take() {
                        transport.clear_observer();
                    }
                    // Cancelled before any `started`/`stopped` event could
                    // ever arrive, so nothing else will release this later.
                    let retained = inner.self_retention.take();
                    let signals = compute_signals(&old, &snapshot(&inner));
                    drop(inner);
                    drop(retained);
                    self.fire(signals);
                    true
                } else {
                    // Lost the race: the transport is already past the
                    // point where cancellation would take effect. Report
                    // failure and leave state untouched — it will progress
                    // to `Started` on its own and can be stopped normally.
                    false
                }
            }
            ReplicatorState::Started => {
                let old = snapshot(&inner);
                inner.state = ReplicatorState::Stopping;
                let transport = inner.transport.clone();
                let signals = compute_signals(&old, &snapshot(&inner));
                drop(inner);
                self.fire(signals);
                if let Some(transport) = transport {
                    transport.stop();
                }
                true
            }
            ReplicatorState::Stopping => true,
            _ => true,
        }
    }

    fn fire(&self, signals: Signals) {
        let delegate = self.delegate.lock().expect("delegate mutex poisoned").clone();
        let Some(delegate) = delegate else { return };
        if signals.state_changed {
            delegate.did_change_state(self);
        }
        if signals.progress_changed {
            delegate.did_change_progress(self);
        }
        if signals.completing {
            delegate.did_complete(self);
        }
        if signals.erroring {
            if let Some(err) = self.error() {
                delegate.did_error(self, &err);
            }
        }
    }
}

impl TransportObserver for Replicator {
    fn on_started(&self) {
        trace!("replicator observed transport started event");
        let mut inner = self.inner.lock().expect("replicator mutex poisoned");
        let old = snapshot(&inner);
        if inner.state == ReplicatorState::Pending {
            inner.state = ReplicatorState::Started;
        }
        let signals = compute_signals(&old, &snapshot(&inner));
        drop(inner);
        self.fire(signals);
    }

    fn on_progress(&self, status: TransportStatus) {
        let mut inner = self.inner.lock().expect("replicator mutex poisoned");
        if inner.state.is_terminal() {
            trace!("ignoring progress event delivered after terminal state");
            return;
        }
        let old = snapshot(&inner);
        inner.changes_processed = status.changes_processed;
        inner.changes_total = status.changes_total;
        if status.running && inner.state != ReplicatorState::Stopping {
            // Covers a late-delivered `started` event.
            inner.state = ReplicatorState::Started;
        }
        let signals = compute_signals(&old, &snapshot(&inner));
        drop(inner);
        self.fire(signals);
    }

    fn on_stopped(&self, status: TransportStatus) {
        info!("replicator observed transport stopped event, error={:?}", status.error.is_some());
        let mut inner = self.inner.lock().expect("replicator mutex poisoned");
        if inner.state.is_terminal() {
            return;
        }
        let old = snapshot(&inner);
        let previous_state = old.state;
        if let Some(transport_err) = status.error {
            inner.state = ReplicatorState::Error;
            inner.error = Some(Error::from_transport(transport_err));
        } else {
            inner.state = match previous_state {
                ReplicatorState::Started => ReplicatorState::Complete,
                _ => ReplicatorState::Stopped,
            };
        }
        if let Some(transport) = inner.transport.take() {
            transport.clear_observer();
        }
        // Release the self-retention exactly once, on arrival at a
        // terminal state.
        let retained = inner.self_retention.take();
        let signals = compute_signals(&old, &snapshot(&inner));
        drop(inner);
        drop(retained);
        self.fire(signals);
    }
}
